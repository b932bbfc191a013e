//! Stress drivers for the bridge simulation
//!
//! Both scenarios only queue arrivals and change configuration; the cars go
//! through the same admission and following protocol as any other car.

use log::info;

use super::config::ConfigError;
use super::controller::BridgeController;
use super::types::Direction;

/// Arrival rate used by both scenarios, in cars per minute
pub const SCENARIO_FREQUENCY: i32 = 300;

/// Cars queued in the majority direction by the starvation scenario
pub const STARVATION_MAJORITY_CARS: usize = 80;

/// The single minority car is queued after this many majority cars
pub const STARVATION_MINORITY_AFTER: usize = 4;

/// Raw speed used by the deadlock scenario (10 units per tick)
pub const DEADLOCK_RAW_SPEED: i32 = 300;

/// Cars queued by the deadlock scenario, alternating directions
pub const DEADLOCK_CARS: usize = 20;

impl BridgeController {
    /// Flood the bridge from one side with a single car coming the other way
    pub fn starvation_scenario(&mut self) -> Result<(), ConfigError> {
        self.set_create_frequency(SCENARIO_FREQUENCY)?;
        for i in 0..STARVATION_MAJORITY_CARS {
            self.create_car(Direction::Up);
            if i + 1 == STARVATION_MINORITY_AFTER {
                self.create_car(Direction::Down);
            }
        }
        info!(
            "Starvation scenario: {} up cars queued with one down car",
            STARVATION_MAJORITY_CARS
        );
        Ok(())
    }

    /// Disable protection and flood both sides
    pub fn deadlock_scenario(&mut self) -> Result<(), ConfigError> {
        self.set_create_frequency(SCENARIO_FREQUENCY)?;
        self.set_car_speed(DEADLOCK_RAW_SPEED)?;
        self.set_protect(false);
        for i in 0..DEADLOCK_CARS {
            let direction = if i % 2 == 0 {
                Direction::Up
            } else {
                Direction::Down
            };
            self.create_car(direction);
        }
        info!(
            "Deadlock scenario: {} cars queued with protection off",
            DEADLOCK_CARS
        );
        Ok(())
    }
}
