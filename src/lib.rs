//! # stepper-fsm
//!
//! State-machine supervision of stepper motors behind a register-level controller.
//!
//! ## Features
//!
//! - **Explicit state machine**: `disabled`, `idle`, `moving`, `error`, plus
//!   `calibrating` and `calculatingTolerance` for motors with end switches
//! - **Poll-to-advance**: background work completes when the motor is next queried
//! - **End-switch calibration**: drive into both switches and re-zero the axis
//! - **Tolerance estimation**: sample the switches and flag drift beyond three sigma
//! - **Configuration-driven**: define motors in TOML files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stepper_fsm::{DummyMotorController, MotorBuilder, SystemConfig};
//!
//! let config: SystemConfig = stepper_fsm::load_config("motors.toml")?;
//!
//! let motor = MotorBuilder::new()
//!     .from_config(&config, "slit")?
//!     .controller(Arc::new(DummyMotorController::new()))
//!     .build_referenced()?;
//!
//! motor.set_enabled(true);
//! motor.calibrate()?;
//! motor.wait_for_idle();
//!
//! motor.set_target_position(2.5)?;
//! motor.start();
//! motor.wait_for_idle();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - heapless strings keep the config errors allocation-free
#![allow(clippy::result_large_err)]

// Core modules
pub mod config;
pub mod controller;
pub mod error;
pub mod fsm;
pub mod motor;

// Re-exports for ergonomic API
pub use config::{
    load_config, parse_config, validate_config, MotorConfig, ScalingConverter, SoftwareLimits,
    SystemConfig, UnitsConverter,
};
pub use controller::{DecoderReadoutMode, DummyMotorController, MotorController, ReferenceSwitchData};
pub use error::{ConfigError, Error, ErrorMode, MotorError, Result};
pub use motor::{
    BasicMotor, CalibrationMode, MotorBuilder, MotorState, ReferencedMotor, Sign,
};
