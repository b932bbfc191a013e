//! Car movement logic for the bridge simulation
//!
//! A car advances by its captured speed each tick it is runnable, never past
//! its current cap. It suspends when it reaches the cap and only becomes
//! runnable again when the cap is raised or it is promoted.

use thiserror::Error;

use super::config::CarSpec;
use super::types::{CarId, CarState, Direction};

/// Broken caller contract on a car
#[derive(Debug, Error, PartialEq)]
pub enum ContractViolation {
    #[error("cap {cap} for {car} would retreat below its position {position}")]
    CapRetreat { car: CarId, cap: i32, position: i32 },
    #[error("{0} has already exited")]
    AlreadyExited(CarId),
    #[error("{0} is not queued and cannot be started")]
    NotQueued(CarId),
    #[error("{0} is not known to the simulation")]
    UnknownCar(CarId),
}

/// Result of a single movement step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarStep {
    /// Moved to the new position
    Advanced(i32),
    /// Reached the end of the bridge
    Exited,
    /// Sitting at its cap, waiting for a cap update
    Suspended,
    /// Front to front with an oncoming car
    Blocked,
}

/// A car on (or waiting for) the bridge
#[derive(Debug, Clone)]
pub struct BridgeCar {
    pub id: CarId,
    pub direction: Direction,
    pub spec: CarSpec,
    position: i32,
    max_advance: i32,
    state: CarState,
    /// The car directly behind in the same direction
    follower: Option<CarId>,
    suspended: bool,
    blocked_head_on: bool,
    queued_at: u64,
    entered_at: Option<u64>,
}

impl BridgeCar {
    /// Create a queued car holding at the entrance
    pub fn new(
        id: CarId,
        direction: Direction,
        spec: CarSpec,
        initial_cap: i32,
        queued_at: u64,
    ) -> Self {
        Self {
            id,
            direction,
            spec,
            position: 0,
            max_advance: initial_cap.max(0),
            state: CarState::Queued,
            follower: None,
            suspended: false,
            blocked_head_on: false,
            queued_at,
            entered_at: None,
        }
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn max_advance(&self) -> i32 {
        self.max_advance
    }

    pub fn state(&self) -> CarState {
        self.state
    }

    pub fn follower(&self) -> Option<CarId> {
        self.follower
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_blocked_head_on(&self) -> bool {
        self.blocked_head_on
    }

    pub fn queued_at(&self) -> u64 {
        self.queued_at
    }

    pub fn entered_at(&self) -> Option<u64> {
        self.entered_at
    }

    /// Ticks spent waiting at the entrance as of `now`
    pub fn wait_ticks(&self, now: u64) -> u64 {
        self.entered_at.unwrap_or(now).saturating_sub(self.queued_at)
    }

    /// Crossing and not suspended
    pub fn is_runnable(&self) -> bool {
        self.state == CarState::Crossing && !self.suspended
    }

    /// Rear edge of the car; a follower's front may not pass it
    pub fn rear(&self) -> i32 {
        self.position - self.spec.car_width
    }

    pub(crate) fn set_follower(&mut self, follower: CarId) {
        self.follower = Some(follower);
    }

    /// Update the cap; it may never retreat below the current position
    pub fn set_max_advance(&mut self, cap: i32) -> Result<(), ContractViolation> {
        if self.state == CarState::Exited {
            return Err(ContractViolation::AlreadyExited(self.id));
        }
        if cap < self.position {
            return Err(ContractViolation::CapRetreat {
                car: self.id,
                cap,
                position: self.position,
            });
        }
        self.max_advance = cap;
        if cap > self.position && !self.blocked_head_on {
            self.suspended = false;
        }
        Ok(())
    }

    /// Promote from Queued to Crossing
    pub fn start(&mut self, now: u64) -> Result<(), ContractViolation> {
        if self.state != CarState::Queued {
            return Err(ContractViolation::NotQueued(self.id));
        }
        self.state = CarState::Crossing;
        self.entered_at = Some(now);
        self.suspended = self.max_advance <= self.position;
        Ok(())
    }

    /// Advance one tick
    ///
    /// `oncoming_limit` is the furthest position reachable before touching
    /// the front of an oncoming car.
    pub fn step(&mut self, oncoming_limit: i32) -> CarStep {
        if self.state == CarState::Exited {
            return CarStep::Exited;
        }
        if !self.is_runnable() {
            return if self.blocked_head_on {
                CarStep::Blocked
            } else {
                CarStep::Suspended
            };
        }

        let cap = self.max_advance.min(self.spec.bridge_length);
        let target = (self.position + self.spec.speed).min(cap).min(oncoming_limit);

        if target > self.position {
            self.position = target;
            if self.position >= self.spec.bridge_length {
                self.state = CarState::Exited;
                return CarStep::Exited;
            }
            if self.position == cap {
                self.suspended = true;
            }
            return CarStep::Advanced(self.position);
        }

        // No room left: decide what is holding us back
        self.suspended = true;
        if oncoming_limit <= self.position && oncoming_limit < cap {
            self.blocked_head_on = true;
            CarStep::Blocked
        } else {
            CarStep::Suspended
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::SimId;

    fn spec() -> CarSpec {
        CarSpec {
            bridge_length: 400,
            car_width: 60,
            speed: 8,
        }
    }

    fn car(id: usize, cap: i32) -> BridgeCar {
        BridgeCar::new(CarId(SimId(id)), Direction::Up, spec(), cap, 0)
    }

    fn run_to_end(car: &mut BridgeCar, ticks: usize) -> Vec<CarStep> {
        (0..ticks).map(|_| car.step(i32::MAX)).collect()
    }

    #[test]
    fn advances_by_speed_and_exits_once() {
        let mut car = car(1, 400);
        car.start(0).unwrap();
        assert_eq!(car.step(i32::MAX), CarStep::Advanced(8));
        let steps = run_to_end(&mut car, 60);
        assert_eq!(
            steps.iter().filter(|s| **s == CarStep::Exited).count(),
            // exited on the 50th step, later steps report the terminal state
            steps.len() - 48
        );
        assert_eq!(car.state(), CarState::Exited);
        assert_eq!(car.position(), 400);
    }

    #[test]
    fn suspends_at_cap_and_resumes_on_update() {
        let mut car = car(1, 20);
        car.start(0).unwrap();
        assert_eq!(car.step(i32::MAX), CarStep::Advanced(8));
        assert_eq!(car.step(i32::MAX), CarStep::Advanced(16));
        assert_eq!(car.step(i32::MAX), CarStep::Advanced(20));
        assert!(car.is_suspended());
        assert_eq!(car.step(i32::MAX), CarStep::Suspended);

        car.set_max_advance(100).unwrap();
        assert!(car.is_runnable());
        assert_eq!(car.step(i32::MAX), CarStep::Advanced(28));
    }

    #[test]
    fn cap_may_not_retreat_below_position() {
        let mut car = car(3, 400);
        car.start(0).unwrap();
        car.step(i32::MAX);
        car.step(i32::MAX);
        assert_eq!(car.position(), 16);
        assert_eq!(
            car.set_max_advance(10),
            Err(ContractViolation::CapRetreat {
                car: CarId(SimId(3)),
                cap: 10,
                position: 16
            })
        );
        assert_eq!(car.max_advance(), 400);
        // Lowering to exactly the position is allowed
        assert!(car.set_max_advance(16).is_ok());
    }

    #[test]
    fn repeated_cap_updates_match_single_update() {
        let mut stepwise = car(1, 0);
        let mut direct = car(2, 0);
        stepwise.start(0).unwrap();
        direct.start(0).unwrap();

        for cap in [50, 120, 120, 250] {
            stepwise.set_max_advance(cap).unwrap();
        }
        direct.set_max_advance(250).unwrap();

        for _ in 0..40 {
            assert_eq!(stepwise.step(i32::MAX), direct.step(i32::MAX));
            assert_eq!(stepwise.position(), direct.position());
        }
        assert_eq!(direct.position(), 250);
    }

    #[test]
    fn blocked_by_oncoming_front() {
        let mut car = car(1, 400);
        car.start(0).unwrap();
        assert_eq!(car.step(4), CarStep::Advanced(4));
        assert_eq!(car.step(4), CarStep::Blocked);
        assert!(car.is_blocked_head_on());
        // A raised cap does not lift a head-on block
        car.set_max_advance(400).unwrap();
        assert!(!car.is_runnable());
    }

    #[test]
    fn exited_car_rejects_updates() {
        let mut car = car(9, 400);
        car.start(0).unwrap();
        run_to_end(&mut car, 50);
        assert_eq!(
            car.set_max_advance(400),
            Err(ContractViolation::AlreadyExited(CarId(SimId(9))))
        );
        assert_eq!(car.start(1), Err(ContractViolation::NotQueued(CarId(SimId(9)))));
    }
}
