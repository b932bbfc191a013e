//! Core types for the bridge simulation
//!
//! These are standalone types shared by every component.

use std::fmt;

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimId(pub usize);

/// A wrapper type for car IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CarId(pub SimId);

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "car#{}", self.0 .0)
    }
}

/// Travel direction across the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Up, Direction::Down];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Index into per-direction arrays
    pub fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Lifecycle of a car
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarState {
    /// Waiting at the entrance for admission
    Queued,
    /// On the bridge
    Crossing,
    /// Reached the far end
    Exited,
}

/// Default length of the bridge in simulation units
pub const DEFAULT_BRIDGE_LENGTH: i32 = 400;

/// Default car width, also the minimum gap between same-direction cars
pub const DEFAULT_CAR_WIDTH: i32 = 60;

/// Default car speed in units per tick
pub const DEFAULT_CAR_SPEED: i32 = 8;

/// Default mean interval between arrivals in milliseconds
pub const DEFAULT_CREATE_INTERVAL_MS: f64 = 500.0;

/// Simulated milliseconds per tick
pub const DEFAULT_TICK_MS: u32 = 10;

/// Timeout threshold used when the time limit is switched on
pub const TIME_LIMIT_TICKS: u64 = 5000;

/// Raw speed input is divided by this factor
pub const SPEED_INPUT_SCALE: i32 = 30;

/// Fairness passes suppressed after a switch
pub const DEFAULT_COOLDOWN_PASSES: u32 = 20;

/// Period of the traffic status and car count reports
pub const DEFAULT_STATUS_PERIOD_TICKS: u64 = 30;
