//! Motor states, events and calibration modes.

use core::fmt;

/// States of the motor state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorState {
    /// Transient start state, left during construction.
    Init,
    /// Motor current and end-switch power are off.
    Disabled,
    /// Powered and at rest.
    Idle,
    /// A move is in flight.
    Moving,
    /// A latent fault was recorded; leave with `reset_error()`.
    Error,
    /// Driving into both end switches to learn their positions.
    Calibrating,
    /// Sampling the end-switch positions to estimate their noise.
    CalculatingTolerance,
}

impl MotorState {
    /// State name.
    pub const fn name(self) -> &'static str {
        match self {
            MotorState::Init => "init",
            MotorState::Disabled => "disabled",
            MotorState::Idle => "idle",
            MotorState::Moving => "moving",
            MotorState::Error => "error",
            MotorState::Calibrating => "calibrating",
            MotorState::CalculatingTolerance => "calculatingTolerance",
        }
    }

    /// Whether a background action is logically active.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            MotorState::Moving | MotorState::Calibrating | MotorState::CalculatingTolerance
        )
    }

    /// Whether the motor is at rest (`idle` or `disabled`).
    pub const fn is_idle(self) -> bool {
        matches!(self, MotorState::Idle | MotorState::Disabled)
    }
}

impl fmt::Display for MotorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How much of the axis is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CalibrationMode {
    /// No reference.
    #[default]
    None = 0,
    /// Only a zero point is known.
    Simple = 1,
    /// Both end-switch positions are known.
    Full = 2,
}

impl CalibrationMode {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CalibrationMode::Simple,
            2 => CalibrationMode::Full,
            _ => CalibrationMode::None,
        }
    }
}

/// Direction towards one of the end switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// Towards the positive end switch.
    Positive,
    /// Towards the negative end switch.
    Negative,
}

impl Sign {
    /// `+1` or `-1`.
    #[inline]
    pub const fn value(self) -> i32 {
        match self {
            Sign::Positive => 1,
            Sign::Negative => -1,
        }
    }
}

/// Events understood by the motor state machines.
pub mod events {
    use crate::fsm::Event;

    /// Leave the transient start state.
    pub const INITIAL: Event = Event::new("initial");
    /// Power the motor.
    pub const ENABLE: Event = Event::new("enable");
    /// Remove power.
    pub const DISABLE: Event = Event::new("disable");
    /// Start moving to the stored target.
    pub const MOVE: Event = Event::new("move");
    /// Stop the current action.
    pub const STOP: Event = Event::new("stop");
    /// Record a fault.
    pub const ERROR: Event = Event::new("error");
    /// Cut power immediately and record a fault.
    pub const EMERGENCY_STOP: Event = Event::new("emergencyStop");
    /// Leave `error` with current enabled.
    pub const RESET_TO_IDLE: Event = Event::new("resetToIdle");
    /// Leave `error` with current disabled.
    pub const RESET_TO_DISABLE: Event = Event::new("resetToDisable");
    /// Start an end-switch calibration.
    pub const CALIBRATE: Event = Event::new("calibrate");
    /// Start a tolerance estimation.
    pub const DETERMINE_TOLERANCE: Event = Event::new("determineTolerance");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_and_idle_states() {
        assert!(MotorState::Moving.is_active());
        assert!(MotorState::Calibrating.is_active());
        assert!(MotorState::CalculatingTolerance.is_active());
        assert!(!MotorState::Idle.is_active());
        assert!(!MotorState::Error.is_active());

        assert!(MotorState::Idle.is_idle());
        assert!(MotorState::Disabled.is_idle());
        assert!(!MotorState::Error.is_idle());
        assert!(!MotorState::Moving.is_idle());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(MotorState::CalculatingTolerance.to_string(), "calculatingTolerance");
        assert_eq!(MotorState::Idle.name(), "idle");
    }

    #[test]
    fn test_calibration_mode_from_u8() {
        assert_eq!(CalibrationMode::from_u8(2), CalibrationMode::Full);
        assert_eq!(CalibrationMode::from_u8(1), CalibrationMode::Simple);
        assert_eq!(CalibrationMode::from_u8(9), CalibrationMode::None);
    }
}
