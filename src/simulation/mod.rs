//! Standalone bridge simulation module
//!
//! This module contains the admission and car-following logic for a
//! single-lane bridge. It runs headless and can be driven tick by tick from
//! tests or from the command line.

mod arrival;
mod car;
mod config;
mod controller;
mod follow_chain;
mod forecast;
mod gate;
mod scenarios;
mod stats;
mod telemetry;
mod types;

// Re-export public types for external use
pub use arrival::{ArrivalGenerator, PoissonProcess};
pub use car::{BridgeCar, CarStep, ContractViolation};
pub use config::{
    interval_from_frequency, scale_speed, time_limit_for, BridgeConfig, CarSpec, ConfigError,
    CooldownPolicy,
};
pub use controller::BridgeController;
pub use follow_chain::{follow_cap, FollowChain};
pub use forecast::ChainForecast;
pub use gate::{GateController, GateStatus, SwitchReason};
pub use scenarios::{
    DEADLOCK_CARS, DEADLOCK_RAW_SPEED, SCENARIO_FREQUENCY, STARVATION_MAJORITY_CARS,
    STARVATION_MINORITY_AFTER,
};
pub use stats::BridgeStats;
pub use telemetry::{BridgeEvent, LogSink, NullSink, TelemetrySink};
pub use types::{
    CarId, CarState, Direction, SimId, DEFAULT_BRIDGE_LENGTH, DEFAULT_CAR_SPEED,
    DEFAULT_CAR_WIDTH, DEFAULT_COOLDOWN_PASSES, DEFAULT_CREATE_INTERVAL_MS,
    DEFAULT_STATUS_PERIOD_TICKS, DEFAULT_TICK_MS, SPEED_INPUT_SCALE, TIME_LIMIT_TICKS,
};
