//! Configuration module for stepper-fsm.
//!
//! Provides the motor configuration records a motor is constructed from, loaded
//! from TOML files or built in code.

mod limits;
mod loader;
mod motor;
mod system;
pub mod units;
mod validation;

pub use limits::SoftwareLimits;
pub use loader::{load_config, parse_config};
pub use motor::MotorConfig;
pub use system::{SystemConfig, MAX_MOTORS};
pub use units::{ScalingConverter, UnitsConverter};
pub use validation::{validate_config, validate_motor};
