//! Error types for stepper-fsm.
//!
//! Two disjoint taxonomies live here. [`MotorError`] is a synchronous rejection returned
//! by a call that did not change the motor; [`ErrorMode`] is a latent fault recorded by a
//! transition or a background action and only cleared by `reset_error()`.

use core::fmt;

use thiserror::Error;

/// Result type alias using the library's Error type by default.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for all stepper-fsm operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Configuration parsing or validation error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Motor operation rejected
    #[error("Motor error: {0}")]
    Motor(#[from] MotorError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    #[error("Parse error: {0}")]
    ParseError(heapless::String<128>),
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(heapless::String<128>),
    /// Motor name not found in configuration
    #[error("Motor '{0}' not found")]
    MotorNotFound(heapless::String<32>),
    /// Units-per-step factor must be finite and non-zero
    #[error("Invalid units per step: {0}. Must be finite and non-zero")]
    InvalidUnitsPerStep(f64),
    /// Poll interval must be at least one millisecond
    #[error("Invalid poll interval: {0} ms. Must be > 0")]
    InvalidPollInterval(u64),
    /// A builder was missing a required part
    #[error("{0} is required")]
    MissingField(&'static str),
    /// Invalid software limits (min must be < max)
    #[error("Invalid software limits: min ({min}) must be < max ({max})")]
    InvalidSoftLimits {
        /// Minimum limit value
        min: i32,
        /// Maximum limit value
        max: i32,
    },
}

/// Synchronous rejection of a motor operation.
///
/// A rejected call leaves the motor untouched; the caller retries later or fixes its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MotorError {
    /// The motor is moving, calibrating or calculating its tolerance.
    #[error("system is in action")]
    SystemInAction,
    /// A position or limit is out of range, or would overflow.
    #[error("invalid parameter")]
    InvalidParameter,
    /// No reference point is known yet.
    #[error("system is not calibrated")]
    SystemNotCalibrated,
}

/// Latent fault of a motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ErrorMode {
    /// No fault recorded.
    #[default]
    NoError = 0,
    /// A generic action failed.
    ActionError = 1,
    /// Calibration or tolerance estimation failed, or an end switch drifted.
    CalibrationError = 2,
    /// Both end switches reported active at once.
    BothEndSwitchesOn = 3,
    /// A move stopped short of its target.
    MoveInterrupted = 4,
    /// The motor was emergency stopped.
    EmergencyStop = 5,
}

impl ErrorMode {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ErrorMode::ActionError,
            2 => ErrorMode::CalibrationError,
            3 => ErrorMode::BothEndSwitchesOn,
            4 => ErrorMode::MoveInterrupted,
            5 => ErrorMode::EmergencyStop,
            _ => ErrorMode::NoError,
        }
    }
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorMode::NoError => "NO_ERROR",
            ErrorMode::ActionError => "ACTION_ERROR",
            ErrorMode::CalibrationError => "CALIBRATION_ERROR",
            ErrorMode::BothEndSwitchesOn => "BOTH_END_SWITCHES_ON",
            ErrorMode::MoveInterrupted => "MOVE_INTERRUPTED",
            ErrorMode::EmergencyStop => "EMERGENCY_STOP",
        };
        f.write_str(name)
    }
}

impl ConfigError {
    pub(crate) fn parse(msg: &str) -> Self {
        ConfigError::ParseError(truncated(msg))
    }

    pub(crate) fn io(msg: &str) -> Self {
        ConfigError::IoError(truncated(msg))
    }
}

fn truncated<const N: usize>(msg: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in msg.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
