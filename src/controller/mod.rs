//! Motor controller interface.
//!
//! The register-level protocol that talks to the controller chip lives below this
//! trait. A motor holds exactly one handle for its whole lifetime and shares it with its
//! background actions, so every method takes `&self`.

mod dummy;

pub use dummy::DummyMotorController;

/// Snapshot of the reference (end) switch bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReferenceSwitchData {
    /// The positive end switch is currently active.
    pub positive_active: bool,
    /// The negative end switch is currently active.
    pub negative_active: bool,
    /// The positive end switch is wired and enabled.
    pub positive_enabled: bool,
    /// The negative end switch is wired and enabled.
    pub negative_enabled: bool,
}

/// How the decoder (encoder input) is read out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderReadoutMode {
    /// Incremental encoder.
    #[default]
    Incremental,
    /// Absolute encoder.
    Absolute,
}

/// Step-granular access to one motor channel of a controller.
pub trait MotorController: Send + Sync {
    /// Actual position in steps.
    fn get_actual_position(&self) -> i32;
    /// Overwrite the actual position (the motor does not move).
    fn set_actual_position(&self, steps: i32);
    /// Target position in steps.
    fn get_target_position(&self) -> i32;
    /// Command a new target position.
    fn set_target_position(&self, steps: i32);
    /// Whether the motor is currently stepping.
    fn is_motor_moving(&self) -> bool;

    /// Whether the driver is enabled.
    fn is_enabled(&self) -> bool;
    /// Switch the motor current on or off.
    fn set_motor_current_enabled(&self, enable: bool);
    /// Whether the motor current is on.
    fn is_motor_current_enabled(&self) -> bool;
    /// Switch the end-switch supply on or off.
    fn set_end_switch_power_enabled(&self, enable: bool);
    /// Whether the end-switch supply is on.
    fn is_end_switch_power_enabled(&self) -> bool;
    /// Read the reference switch bits.
    fn get_reference_switch_data(&self) -> ReferenceSwitchData;

    /// Persist the calibrated positive end-switch position.
    fn set_positive_reference_switch_calibration(&self, steps: i32);
    /// Persisted positive end-switch position.
    fn get_positive_reference_switch_calibration(&self) -> i32;
    /// Persist the calibrated negative end-switch position.
    fn set_negative_reference_switch_calibration(&self, steps: i32);
    /// Persisted negative end-switch position.
    fn get_negative_reference_switch_calibration(&self) -> i32;
    /// Persist the calibration timestamp (seconds since the epoch, 0 = uncalibrated).
    fn set_calibration_time(&self, time: u32);
    /// Persisted calibration timestamp.
    fn get_calibration_time(&self) -> u32;

    /// Decoder position in encoder steps.
    fn get_decoder_position(&self) -> i32;
    /// Decoder readout mode.
    fn get_decoder_readout_mode(&self) -> DecoderReadoutMode;

    /// Switch full-step mode on or off. Switching it on rounds to the nearest full step.
    fn enable_full_stepping(&self, enable: bool);
    /// Whether full-step mode is on.
    fn is_full_stepping(&self) -> bool;

    /// Set the user speed limit; returns the value actually applied.
    fn set_user_speed_limit(&self, limit: f64) -> f64;
    /// Current user speed limit.
    fn get_user_speed_limit(&self) -> f64;
    /// Highest speed the controller supports.
    fn get_max_speed_capability(&self) -> f64;
    /// Set the user current limit; returns the value actually applied.
    fn set_user_current_limit(&self, limit: f64) -> f64;
    /// Current user current limit.
    fn get_user_current_limit(&self) -> f64;
    /// Highest current the controller can safely drive.
    fn get_max_current_limit(&self) -> f64;
}
