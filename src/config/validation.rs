//! Configuration validation.

use crate::error::{ConfigError, Result};

use super::{MotorConfig, SystemConfig};

/// Validate a system configuration.
///
/// Checks every motor:
/// - Unit conversion factors are finite and non-zero
/// - The poll interval is non-zero
/// - Software limits are valid (min < max)
pub fn validate_config(config: &SystemConfig) -> Result<()> {
    for (_, motor) in config.motors.iter() {
        validate_motor(motor)?;
    }
    Ok(())
}

/// Validate a single motor configuration.
pub fn validate_motor(config: &MotorConfig) -> Result<()> {
    config.motor_converter()?;
    config.encoder_converter()?;

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::InvalidPollInterval(config.poll_interval_ms).into());
    }

    if let Some(ref limits) = config.limits {
        if !limits.is_valid() {
            return Err(ConfigError::InvalidSoftLimits {
                min: limits.min_steps,
                max: limits.max_steps,
            }
            .into());
        }
    }

    Ok(())
}
