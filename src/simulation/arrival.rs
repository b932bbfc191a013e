//! Arrival generation for the bridge simulation
//!
//! Cars arrive either from explicit requests or, when auto-create is on, with a
//! random direction. Both kinds are paced by the same Poisson process.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::VecDeque;

use super::config::{validate_interval, ConfigError};
use super::types::Direction;

/// Exponential inter-arrival delays with a configurable mean
#[derive(Debug, Clone)]
pub struct PoissonProcess {
    mean_interval_ms: f64,
}

impl PoissonProcess {
    pub fn new(mean_interval_ms: f64) -> Result<Self, ConfigError> {
        validate_interval(mean_interval_ms)?;
        Ok(Self { mean_interval_ms })
    }

    pub fn configure(&mut self, mean_interval_ms: f64) -> Result<(), ConfigError> {
        validate_interval(mean_interval_ms)?;
        self.mean_interval_ms = mean_interval_ms;
        Ok(())
    }

    pub fn mean_interval_ms(&self) -> f64 {
        self.mean_interval_ms
    }

    /// Sample the next delay in milliseconds (inverse transform)
    pub fn next_delay<R: Rng>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        -self.mean_interval_ms * (1.0 - u).ln()
    }
}

/// Source of car arrivals
///
/// Explicit requests are served first in FIFO order. When they run out and
/// auto-create is on, a random direction is drawn instead.
pub struct ArrivalGenerator {
    process: PoissonProcess,
    requests: VecDeque<Direction>,
    auto_create: bool,
    up_probability: f64,
    rng: StdRng,
}

impl ArrivalGenerator {
    pub fn new(
        mean_interval_ms: f64,
        auto_create: bool,
        up_probability: f64,
        seed: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&up_probability) {
            return Err(ConfigError::InvalidProbability(up_probability));
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            process: PoissonProcess::new(mean_interval_ms)?,
            requests: VecDeque::new(),
            auto_create,
            up_probability,
            rng,
        })
    }

    /// Set the mean of the Poisson process
    pub fn configure(&mut self, mean_interval_ms: f64) -> Result<(), ConfigError> {
        self.process.configure(mean_interval_ms)
    }

    pub fn set_auto_create(&mut self, on: bool) {
        self.auto_create = on;
    }

    pub fn auto_create(&self) -> bool {
        self.auto_create
    }

    pub fn set_up_probability(&mut self, up_probability: f64) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&up_probability) {
            return Err(ConfigError::InvalidProbability(up_probability));
        }
        self.up_probability = up_probability;
        Ok(())
    }

    /// Enqueue one explicit arrival
    pub fn create_car(&mut self, direction: Direction) {
        self.requests.push_back(direction);
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Whether an arrival is available right now
    pub fn has_arrival(&self) -> bool {
        self.auto_create || !self.requests.is_empty()
    }

    /// Take the next arrival, if any
    pub fn next_direction(&mut self) -> Option<Direction> {
        if let Some(direction) = self.requests.pop_front() {
            return Some(direction);
        }
        if !self.auto_create {
            return None;
        }
        if self.rng.random_bool(self.up_probability) {
            Some(Direction::Up)
        } else {
            Some(Direction::Down)
        }
    }

    /// Next inter-arrival delay in milliseconds
    pub fn next_delay(&mut self) -> f64 {
        self.process.next_delay(&mut self.rng)
    }

    /// Next inter-arrival delay rounded to whole ticks
    pub fn next_delay_ticks(&mut self, tick_ms: u32) -> u64 {
        let ms = self.next_delay();
        (ms / f64::from(tick_ms.max(1))).round() as u64
    }

    pub fn mean_interval_ms(&self) -> f64 {
        self.process.mean_interval_ms()
    }
}
