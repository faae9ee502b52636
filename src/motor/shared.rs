//! Fields shared between API callers and background actions.
//!
//! Background actions never take the motor lock, so everything they touch lives here
//! behind independent atomics.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};

use crate::controller::MotorController;
use crate::error::ErrorMode;

use super::state::{CalibrationMode, Sign};

/// Factor applied to an end-switch tolerance before a deviation counts as drift.
pub(crate) const DRIFT_TOLERANCE_FACTOR: f64 = 3.0;

/// `f64` stored as its bit pattern.
#[derive(Debug, Default)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// State common to every motor.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    target_position: AtomicI32,
    calibration_mode: AtomicU8,
    error_mode: AtomicU8,
    error_requested: AtomicBool,
}

impl SharedState {
    pub(crate) fn new(target_position: i32, calibration_mode: CalibrationMode) -> Self {
        Self {
            target_position: AtomicI32::new(target_position),
            calibration_mode: AtomicU8::new(calibration_mode as u8),
            ..Self::default()
        }
    }

    pub(crate) fn target(&self) -> i32 {
        self.target_position.load(Ordering::Acquire)
    }

    pub(crate) fn set_target(&self, steps: i32) {
        self.target_position.store(steps, Ordering::Release);
    }

    pub(crate) fn calibration_mode(&self) -> CalibrationMode {
        CalibrationMode::from_u8(self.calibration_mode.load(Ordering::Acquire))
    }

    pub(crate) fn set_calibration_mode(&self, mode: CalibrationMode) {
        self.calibration_mode.store(mode as u8, Ordering::Release);
    }

    pub(crate) fn error_mode(&self) -> ErrorMode {
        ErrorMode::from_u8(self.error_mode.load(Ordering::Acquire))
    }

    pub(crate) fn set_error_mode(&self, mode: ErrorMode) {
        self.error_mode.store(mode as u8, Ordering::Release);
    }

    /// Record `mode` unless another fault is already recorded.
    pub(crate) fn set_error_mode_if_clear(&self, mode: ErrorMode) {
        let _ = self.error_mode.compare_exchange(
            ErrorMode::NoError as u8,
            mode as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Ask the next lock holder to fire the `error` event.
    pub(crate) fn request_error(&self) {
        self.error_requested.store(true, Ordering::Release);
    }

    pub(crate) fn take_error_request(&self) -> bool {
        self.error_requested.swap(false, Ordering::AcqRel)
    }
}

/// End-switch calibration results of a referenced motor.
#[derive(Debug)]
pub(crate) struct EndSwitchState {
    positive_enabled: bool,
    negative_enabled: bool,
    calib_positive: AtomicI32,
    calib_negative: AtomicI32,
    tolerance_positive: AtomicF64,
    tolerance_negative: AtomicF64,
    pub(crate) tolerance_calculated: AtomicBool,
    pub(crate) calibration_failed: AtomicBool,
    pub(crate) tolerance_calc_failed: AtomicBool,
}

impl EndSwitchState {
    pub(crate) fn new(positive_enabled: bool, negative_enabled: bool) -> Self {
        Self {
            positive_enabled,
            negative_enabled,
            calib_positive: AtomicI32::new(i32::MAX),
            calib_negative: AtomicI32::new(i32::MIN),
            tolerance_positive: AtomicF64::default(),
            tolerance_negative: AtomicF64::default(),
            tolerance_calculated: AtomicBool::new(false),
            calibration_failed: AtomicBool::new(false),
            tolerance_calc_failed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_enabled(&self, sign: Sign) -> bool {
        match sign {
            Sign::Positive => self.positive_enabled,
            Sign::Negative => self.negative_enabled,
        }
    }

    pub(crate) fn both_enabled(&self) -> bool {
        self.positive_enabled && self.negative_enabled
    }

    pub(crate) fn calibrated(&self, sign: Sign) -> i32 {
        match sign {
            Sign::Positive => self.calib_positive.load(Ordering::Acquire),
            Sign::Negative => self.calib_negative.load(Ordering::Acquire),
        }
    }

    pub(crate) fn set_calibrated(&self, negative: i32, positive: i32) {
        self.calib_negative.store(negative, Ordering::Release);
        self.calib_positive.store(positive, Ordering::Release);
    }

    /// Forget the end-switch positions (sentinels cover the whole signed range).
    pub(crate) fn clear_calibration(&self) {
        self.set_calibrated(i32::MIN, i32::MAX);
        self.tolerance_calculated.store(false, Ordering::Release);
    }

    /// Whether `steps` lies between the calibrated end switches.
    pub(crate) fn contains(&self, steps: i32) -> bool {
        steps >= self.calibrated(Sign::Negative) && steps <= self.calibrated(Sign::Positive)
    }

    pub(crate) fn tolerance(&self, sign: Sign) -> f64 {
        match sign {
            Sign::Positive => self.tolerance_positive.load(),
            Sign::Negative => self.tolerance_negative.load(),
        }
    }

    pub(crate) fn set_tolerances(&self, negative: f64, positive: f64) {
        self.tolerance_negative.store(negative);
        self.tolerance_positive.store(positive);
    }

    pub(crate) fn tolerance_calculated(&self) -> bool {
        self.tolerance_calculated.load(Ordering::Acquire)
    }
}

/// Outcome of reading the end switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SwitchReading {
    /// The switch on the requested side is active.
    pub(crate) active: bool,
    /// Both switches were active at once.
    pub(crate) both_active: bool,
}

/// Read the end switches and record any fault they reveal.
///
/// Both switches active at once records `BothEndSwitchesOn` and requests the `error`
/// event; the caller fires it if it holds the motor lock, otherwise the next poll does.
/// An active switch that sits further than [`DRIFT_TOLERANCE_FACTOR`] tolerances from its
/// calibrated position records `CalibrationError` without forcing a transition.
pub(crate) fn read_end_switch(
    controller: &dyn MotorController,
    shared: &SharedState,
    switches: &EndSwitchState,
    sign: Sign,
) -> SwitchReading {
    let data = controller.get_reference_switch_data();
    let both_active = data.positive_active && data.negative_active;
    if both_active {
        tracing::warn!("both end switches active");
        shared.set_error_mode(ErrorMode::BothEndSwitchesOn);
        shared.request_error();
    }

    let active = match sign {
        Sign::Positive => data.positive_active,
        Sign::Negative => data.negative_active,
    };

    if active && switches.tolerance_calculated() {
        let calibrated = switches.calibrated(sign);
        let actual = controller.get_actual_position();
        let deviation = (i64::from(actual) - i64::from(calibrated)).abs() as f64;
        let tolerance = switches.tolerance(sign);
        if deviation > DRIFT_TOLERANCE_FACTOR * tolerance {
            tracing::warn!(?sign, actual, calibrated, tolerance, "end switch drifted");
            shared.set_error_mode(ErrorMode::CalibrationError);
        }
    }

    SwitchReading {
        active,
        both_active,
    }
}
