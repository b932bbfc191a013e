//! Runtime configuration for the bridge simulation
//!
//! One `BridgeConfig` value is owned by the controller. Every car captures a
//! `CarSpec` snapshot when it is created, so later changes only affect cars
//! created afterwards.

use thiserror::Error;

use super::types::{
    DEFAULT_BRIDGE_LENGTH, DEFAULT_CAR_SPEED, DEFAULT_CAR_WIDTH, DEFAULT_COOLDOWN_PASSES,
    DEFAULT_CREATE_INTERVAL_MS, DEFAULT_STATUS_PERIOD_TICKS, DEFAULT_TICK_MS, SPEED_INPUT_SCALE,
    TIME_LIMIT_TICKS,
};

/// Errors reported when a configuration value is rejected
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bridge length must be positive, got {0}")]
    NonPositiveBridgeLength(i32),
    #[error("car width must be positive, got {0}")]
    NonPositiveCarWidth(i32),
    #[error("car speed must be positive, got {0} units per tick")]
    NonPositiveSpeed(i32),
    #[error("raw speed {raw} scales to {scaled} units per tick, which is not positive")]
    SpeedScalesToZero { raw: i32, scaled: i32 },
    #[error("creation frequency must be positive, got {0} cars per minute")]
    NonPositiveFrequency(i32),
    #[error("mean arrival interval must be a positive finite number of milliseconds, got {0}")]
    InvalidInterval(f64),
    #[error("tick length must be at least one millisecond")]
    ZeroTickLength,
    #[error("timeout threshold must be at least one tick")]
    ZeroTimeLimit,
    #[error("status period must be at least one tick")]
    ZeroStatusPeriod,
    #[error("direction probability must lie in [0, 1], got {0}")]
    InvalidProbability(f64),
}

/// When the fairness cooldown is re-armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooldownPolicy {
    /// Armed only when the allowed direction actually changes
    #[default]
    OnSwitch,
    /// Armed after every completed fairness comparison, switch or not
    OnEvaluation,
}

/// Full simulation configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub bridge_length: i32,
    pub car_width: i32,
    /// Internal speed in units per tick
    pub car_speed: i32,
    pub mean_interval_ms: f64,
    pub tick_ms: u32,
    /// Wait time after which a queued car forces a switch; `None` is unbounded
    pub time_limit: Option<u64>,
    pub protect: bool,
    pub cooldown_passes: u32,
    pub cooldown_policy: CooldownPolicy,
    pub status_period_ticks: u64,
    /// Generate random-direction arrivals in addition to explicit requests
    pub auto_create: bool,
    /// Probability that a generated arrival travels up
    pub up_probability: f64,
    /// Seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_length: DEFAULT_BRIDGE_LENGTH,
            car_width: DEFAULT_CAR_WIDTH,
            car_speed: DEFAULT_CAR_SPEED,
            mean_interval_ms: DEFAULT_CREATE_INTERVAL_MS,
            tick_ms: DEFAULT_TICK_MS,
            time_limit: None,
            protect: true,
            cooldown_passes: DEFAULT_COOLDOWN_PASSES,
            cooldown_policy: CooldownPolicy::default(),
            status_period_ticks: DEFAULT_STATUS_PERIOD_TICKS,
            auto_create: false,
            up_probability: 0.5,
            seed: None,
        }
    }
}

impl BridgeConfig {
    /// Check every field, rejecting degenerate values instead of clamping them
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge_length <= 0 {
            return Err(ConfigError::NonPositiveBridgeLength(self.bridge_length));
        }
        if self.car_width <= 0 {
            return Err(ConfigError::NonPositiveCarWidth(self.car_width));
        }
        if self.car_speed <= 0 {
            return Err(ConfigError::NonPositiveSpeed(self.car_speed));
        }
        validate_interval(self.mean_interval_ms)?;
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTickLength);
        }
        if self.time_limit == Some(0) {
            return Err(ConfigError::ZeroTimeLimit);
        }
        if self.status_period_ticks == 0 {
            return Err(ConfigError::ZeroStatusPeriod);
        }
        if !(0.0..=1.0).contains(&self.up_probability) {
            return Err(ConfigError::InvalidProbability(self.up_probability));
        }
        Ok(())
    }

    /// Snapshot captured by a newly created car
    pub fn car_spec(&self) -> CarSpec {
        CarSpec {
            bridge_length: self.bridge_length,
            car_width: self.car_width,
            speed: self.car_speed,
        }
    }
}

/// Per-car snapshot of the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarSpec {
    pub bridge_length: i32,
    pub car_width: i32,
    pub speed: i32,
}

impl CarSpec {
    /// Ticks needed to cover `distance` at this car's speed
    pub fn ticks_to_cover(&self, distance: i32) -> u64 {
        div_ceil(distance, self.speed)
    }
}

/// Convert cars per minute into a mean interval in milliseconds
pub fn interval_from_frequency(cars_per_minute: i32) -> Result<f64, ConfigError> {
    if cars_per_minute <= 0 {
        return Err(ConfigError::NonPositiveFrequency(cars_per_minute));
    }
    Ok(60_000.0 / f64::from(cars_per_minute))
}

/// Convert raw speed input into internal units per tick
pub fn scale_speed(raw: i32) -> Result<i32, ConfigError> {
    let scaled = raw / SPEED_INPUT_SCALE;
    if scaled <= 0 {
        return Err(ConfigError::SpeedScalesToZero { raw, scaled });
    }
    Ok(scaled)
}

/// Timeout threshold for the on/off time limit switch
pub fn time_limit_for(on: bool) -> Option<u64> {
    on.then_some(TIME_LIMIT_TICKS)
}

pub(crate) fn validate_interval(mean_interval_ms: f64) -> Result<(), ConfigError> {
    if !mean_interval_ms.is_finite() || mean_interval_ms <= 0.0 {
        return Err(ConfigError::InvalidInterval(mean_interval_ms));
    }
    Ok(())
}

fn div_ceil(numerator: i32, denominator: i32) -> u64 {
    let n = numerator.max(0) as u64;
    let d = denominator.max(1) as u64;
    n.div_ceil(d)
}
