//! Look-ahead over a single follow chain
//!
//! A forecast replays the movement rules on copies of one chain's cars, each
//! with the speed and width it was created with. The controller uses it to
//! tell how long a direction needs to clear the bridge and when its waiting
//! cars would get on once the direction is admitted.

use super::car::{BridgeCar, CarStep, ContractViolation};
use super::follow_chain::follow_cap;
use super::types::CarState;

/// Copies of one chain's cars, front first
#[derive(Debug, Clone)]
pub struct ChainForecast {
    cars: Vec<BridgeCar>,
}

impl ChainForecast {
    pub fn new(cars: Vec<BridgeCar>) -> Self {
        Self { cars }
    }

    fn any_crossing(&self) -> bool {
        self.cars.iter().any(|car| car.state() == CarState::Crossing)
    }

    /// Upper bound on `drain_ticks`
    ///
    /// A car leaves at most its own free run after the car ahead has left.
    pub fn drain_bound(&self) -> u64 {
        self.cars
            .iter()
            .filter(|car| car.state() == CarState::Crossing)
            .map(free_run)
            .fold(0, u64::saturating_add)
    }

    /// Movement ticks, the current one included, until no car of the chain
    /// is left on the bridge
    ///
    /// Queued cars stay where they are. Returns `u64::MAX` if the crossing
    /// cars can never all leave.
    pub fn drain_ticks(mut self) -> Result<u64, ContractViolation> {
        let mut ticks = 0;
        while self.any_crossing() {
            if !self.advance()? {
                return Ok(u64::MAX);
            }
            ticks += 1;
        }
        Ok(ticks)
    }

    /// Upper bounds on `entry_offsets`
    pub fn entry_bounds(&self, admit_after: u64) -> Vec<u64> {
        let mut bounds = Vec::new();
        // Latest offset by which the car ahead has left the bridge
        let mut leader_exit: Option<u64> = None;

        for car in &self.cars {
            match car.state() {
                CarState::Crossing => {
                    let exit = leader_exit.unwrap_or(0).saturating_add(free_run(car));
                    leader_exit = Some(exit);
                }
                CarState::Queued => {
                    let entry = match leader_exit {
                        Some(exit) => admit_after.max(exit.saturating_add(1)),
                        None => admit_after,
                    };
                    bounds.push(entry);
                    let start = entry.max(leader_exit.unwrap_or(0));
                    leader_exit = Some(start.saturating_add(free_run(car)));
                }
                CarState::Exited => {}
            }
        }
        bounds
    }

    /// Tick offsets, the current tick being 0, at which each queued car
    /// enters when the direction is admitted from `admit_after` on
    ///
    /// Cars that would never get on are reported as `u64::MAX`.
    pub fn entry_offsets(self, admit_after: u64) -> Result<Vec<u64>, ContractViolation> {
        let queued = self
            .cars
            .iter()
            .filter(|car| car.state() == CarState::Queued)
            .count();
        let mut offsets = Vec::with_capacity(queued);
        self.replay_entries(admit_after, |offset| {
            offsets.push(offset);
            true
        })?;
        offsets.resize(queued, u64::MAX);
        Ok(offsets)
    }

    /// Replay entries from `admit_after` on, handing each entry offset to
    /// `on_entry` in queue order for as long as it returns true
    ///
    /// Stops early when the remaining cars can never get on.
    pub fn replay_entries(
        mut self,
        admit_after: u64,
        mut on_entry: impl FnMut(u64) -> bool,
    ) -> Result<(), ContractViolation> {
        if admit_after == u64::MAX {
            return Ok(());
        }
        let mut entries = Vec::new();
        let mut tick = 0;
        while self.cars.iter().any(|car| car.state() == CarState::Queued) {
            if tick < admit_after && !self.any_crossing() {
                tick = admit_after;
            }
            let admitted = tick >= admit_after;
            let entered = admitted && self.promote(tick, &mut entries)?;
            for offset in entries.drain(..) {
                if !on_entry(offset) {
                    return Ok(());
                }
            }
            let moved = self.advance()?;
            if admitted && !entered && !moved {
                break;
            }
            tick = tick.saturating_add(1);
        }
        Ok(())
    }

    /// Let queued cars on front to back while they have room
    fn promote(&mut self, tick: u64, entries: &mut Vec<u64>) -> Result<bool, ContractViolation> {
        let mut entered = false;
        while let Some(index) = self
            .cars
            .iter()
            .position(|car| car.state() == CarState::Queued)
        {
            let is_head = self.cars[..index]
                .iter()
                .all(|car| car.state() == CarState::Exited);
            let car = &mut self.cars[index];
            if is_head {
                car.set_max_advance(car.spec.bridge_length)?;
            }
            if car.max_advance() <= car.position() {
                break;
            }
            car.start(tick)?;
            entries.push(tick);
            entered = true;
        }
        Ok(entered)
    }

    /// One movement tick, front to back, handing each change to the car behind
    fn advance(&mut self) -> Result<bool, ContractViolation> {
        let mut moved = false;
        for index in 0..self.cars.len() {
            if !self.cars[index].is_runnable() {
                continue;
            }
            let cap = match self.cars[index].step(i32::MAX) {
                CarStep::Advanced(_) => follow_cap(self.cars[index].rear()),
                CarStep::Exited => self.cars[index].spec.bridge_length,
                CarStep::Suspended | CarStep::Blocked => continue,
            };
            moved = true;
            if let Some(follower) = self.cars.get_mut(index + 1) {
                if follower.state() != CarState::Exited {
                    follower.set_max_advance(cap)?;
                }
            }
        }
        Ok(moved)
    }
}

/// Ticks a car needs for the rest of the bridge when nothing holds it back
fn free_run(car: &BridgeCar) -> u64 {
    car.spec.ticks_to_cover(car.spec.bridge_length - car.position())
}
