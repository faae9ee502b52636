//! Motor state machines for stepper-fsm.
//!
//! [`BasicMotor`] covers enable/disable/move/stop/error; [`ReferencedMotor`] adds
//! end-switch calibration and tolerance estimation on top of it.

mod actions;
mod basic;
mod builder;
mod calibration;
mod referenced;
mod shared;
pub mod state;
mod task;

pub use basic::BasicMotor;
pub use builder::MotorBuilder;
pub use calibration::{
    mean_and_std_dev, END_SWITCH_SEARCH_STEPS, TOLERANCE_APPROACH_STEPS, TOLERANCE_SAMPLES,
};
pub use referenced::ReferencedMotor;
pub use state::{events, CalibrationMode, MotorState, Sign};
