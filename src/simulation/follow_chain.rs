//! Per-direction follow chains
//!
//! Cars of one direction are kept in arrival order. Each car's cap is bounded
//! by the rear of the car ahead until that car exits.

use anyhow::{Context, Result};
use std::collections::{HashMap, VecDeque};

use super::car::{BridgeCar, ContractViolation};
use super::types::{CarId, CarState, Direction};

/// Ordered same-direction cars, front first
#[derive(Debug, Clone)]
pub struct FollowChain {
    pub direction: Direction,
    cars: VecDeque<CarId>,
}

/// Cap a follower may use behind a leader whose rear is at `leader_rear`
pub fn follow_cap(leader_rear: i32) -> i32 {
    leader_rear.max(0)
}

impl FollowChain {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            cars: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }

    pub fn head(&self) -> Option<CarId> {
        self.cars.front().copied()
    }

    pub fn tail(&self) -> Option<CarId> {
        self.cars.back().copied()
    }

    /// Cars front to back
    pub fn iter(&self) -> impl Iterator<Item = CarId> + '_ {
        self.cars.iter().copied()
    }

    /// Initial cap for a car joining this chain
    ///
    /// Behind a tail the cap is the tail's rear. An empty chain grants the
    /// whole bridge when the gate admits this direction, otherwise the car
    /// holds at the entrance.
    pub fn initial_cap(
        &self,
        cars: &HashMap<CarId, BridgeCar>,
        bridge_length: i32,
        gate_allows: bool,
    ) -> Result<i32> {
        match self.tail() {
            Some(tail_id) => {
                let tail = cars.get(&tail_id).context("Chain tail not found")?;
                Ok(follow_cap(tail.rear()))
            }
            None if gate_allows => Ok(bridge_length),
            None => Ok(0),
        }
    }

    /// Append a car, linking it behind the current tail
    pub fn attach(&mut self, car_id: CarId, cars: &mut HashMap<CarId, BridgeCar>) -> Result<()> {
        if let Some(tail_id) = self.tail() {
            let tail = cars.get_mut(&tail_id).context("Chain tail not found")?;
            tail.set_follower(car_id);
        }
        self.cars.push_back(car_id);
        Ok(())
    }

    /// Propagate a leader's new position to its follower
    ///
    /// Called once per position change, in the order the changes happened.
    pub fn on_leader_advance(
        &self,
        leader_id: CarId,
        cars: &mut HashMap<CarId, BridgeCar>,
    ) -> Result<Option<CarId>> {
        let leader = cars.get(&leader_id).context("Leader not found")?;
        let Some(follower_id) = leader.follower() else {
            return Ok(None);
        };
        let cap = if leader.state() == CarState::Exited {
            leader.spec.bridge_length
        } else {
            follow_cap(leader.rear())
        };
        let follower = cars
            .get_mut(&follower_id)
            .ok_or(ContractViolation::UnknownCar(follower_id))?;
        follower.set_max_advance(cap)?;
        Ok(Some(follower_id))
    }

    /// Drop the front car once it has exited
    pub fn detach_head(&mut self, car_id: CarId) -> Result<()> {
        match self.cars.front() {
            Some(front) if *front == car_id => {
                self.cars.pop_front();
                Ok(())
            }
            _ => anyhow::bail!("{} exited out of order on the {} chain", car_id, self.direction),
        }
    }

    /// Queued cars front to back
    pub fn queued<'a>(
        &'a self,
        cars: &'a HashMap<CarId, BridgeCar>,
    ) -> impl Iterator<Item = &'a BridgeCar> + 'a {
        self.cars
            .iter()
            .filter_map(|id| cars.get(id))
            .filter(|car| car.state() == CarState::Queued)
    }

    /// Front-most car currently on the bridge
    pub fn lead_crossing<'a>(&self, cars: &'a HashMap<CarId, BridgeCar>) -> Option<&'a BridgeCar> {
        self.cars
            .iter()
            .filter_map(|id| cars.get(id))
            .find(|car| car.state() == CarState::Crossing)
    }

    /// Number of cars currently on the bridge
    pub fn crossing_count(&self, cars: &HashMap<CarId, BridgeCar>) -> usize {
        self.cars
            .iter()
            .filter_map(|id| cars.get(id))
            .filter(|car| car.state() == CarState::Crossing)
            .count()
    }
}
