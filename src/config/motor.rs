//! Motor configuration from TOML.

use core::time::Duration;

use heapless::String;
use serde::Deserialize;

use super::limits::SoftwareLimits;
use super::units::ScalingConverter;
use crate::error::ConfigError;

/// Complete motor configuration from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MotorConfig {
    /// Human-readable name (max 32 chars).
    pub name: String<32>,

    /// Identity of the controller device driving this motor.
    #[serde(default)]
    pub device: String<32>,

    /// User units per motor step.
    #[serde(default = "default_units_per_step")]
    pub units_per_step: f64,

    /// User units per encoder step.
    #[serde(default = "default_units_per_step")]
    pub encoder_units_per_step: f64,

    /// Start moving as soon as a new target is set.
    #[serde(default)]
    pub autostart: bool,

    /// Interval at which background actions and `wait_for_idle` poll the controller.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Optional software limits.
    #[serde(default)]
    pub limits: Option<SoftwareLimits>,
}

fn default_units_per_step() -> f64 {
    1.0
}

fn default_poll_interval_ms() -> u64 {
    10
}

impl MotorConfig {
    /// Create a configuration with defaults for everything but the name.
    pub fn new(name: &str) -> Self {
        Self {
            name: String::try_from(name).unwrap_or_default(),
            device: String::new(),
            units_per_step: default_units_per_step(),
            encoder_units_per_step: default_units_per_step(),
            autostart: false,
            poll_interval_ms: default_poll_interval_ms(),
            limits: None,
        }
    }

    /// Motor-steps converter described by this configuration.
    pub fn motor_converter(&self) -> Result<ScalingConverter, ConfigError> {
        ScalingConverter::new(self.units_per_step)
    }

    /// Encoder-steps converter described by this configuration.
    pub fn encoder_converter(&self) -> Result<ScalingConverter, ConfigError> {
        ScalingConverter::new(self.encoder_units_per_step)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Software limits, unbounded and disabled when not configured.
    pub fn software_limits(&self) -> SoftwareLimits {
        self.limits.unwrap_or_default()
    }
}
