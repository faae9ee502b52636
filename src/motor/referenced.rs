//! Motor with end switches, calibration and tolerance estimation.

use core::ops::Deref;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::MotorConfig;
use crate::controller::MotorController;
use crate::error::{MotorError, Result};

use super::basic::BasicMotor;
use super::actions::Variant;
use super::shared::EndSwitchState;
use super::state::{events, CalibrationMode, Sign};

/// A [`BasicMotor`] that knows its end switches.
///
/// [`calibrate`](Self::calibrate) drives into both end switches and re-zeroes the axis on
/// the negative one; [`determine_tolerance`](Self::determine_tolerance) then samples both
/// switches to learn how repeatable they are. Targets outside the calibrated end switches
/// are rejected, and an end switch that triggers far from its calibrated position records
/// a `CalibrationError`.
///
/// All basic operations are available through `Deref`.
#[derive(Debug)]
pub struct ReferencedMotor {
    base: BasicMotor,
    switches: Arc<EndSwitchState>,
}

impl ReferencedMotor {
    /// Create a motor from its configuration.
    ///
    /// Which end switches are enabled is read once from the controller. A non-zero
    /// calibration time restores a `Full` calibration if both persisted end-switch
    /// positions are set, a `Simple` one otherwise.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(controller: Arc<dyn MotorController>, config: &MotorConfig) -> Result<Self> {
        let data = controller.get_reference_switch_data();
        let switches = Arc::new(EndSwitchState::new(
            data.positive_enabled,
            data.negative_enabled,
        ));

        let mode = if controller.get_calibration_time() == 0 {
            CalibrationMode::None
        } else {
            let positive = controller.get_positive_reference_switch_calibration();
            let negative = controller.get_negative_reference_switch_calibration();
            if positive != i32::MAX && negative != i32::MIN {
                switches.set_calibrated(negative, positive);
                CalibrationMode::Full
            } else {
                CalibrationMode::Simple
            }
        };

        let variant = Variant::Referenced(Arc::clone(&switches));
        let base = BasicMotor::assemble(controller, config, variant, mode)?;
        Ok(Self { base, switches })
    }

    /// Start an end-switch calibration in the background.
    ///
    /// Ignored unless the motor is `idle`. Poll the motor to see it finish.
    ///
    /// # Errors
    ///
    /// `SystemInAction` while a move, calibration or tolerance run is active.
    pub fn calibrate(&self) -> Result<(), MotorError> {
        let mut inner = self.base.lock();
        self.base.ensure_inactive(&mut inner)?;
        self.base.fire(&mut inner, events::CALIBRATE);
        Ok(())
    }

    /// Start a tolerance estimation in the background.
    ///
    /// Needs a `Full` calibration; without one the run fails right away and records a
    /// `CalibrationError`.
    ///
    /// # Errors
    ///
    /// `SystemInAction` while a move, calibration or tolerance run is active.
    pub fn determine_tolerance(&self) -> Result<(), MotorError> {
        let mut inner = self.base.lock();
        self.base.ensure_inactive(&mut inner)?;
        self.base.fire(&mut inner, events::DETERMINE_TOLERANCE);
        Ok(())
    }

    /// Whether the end switch on the `sign` side is active.
    ///
    /// Both switches active at once records `BothEndSwitchesOn` and moves the motor to
    /// `error` immediately. A switch that triggers further than three tolerances from its
    /// calibrated position records `CalibrationError`.
    pub fn is_end_switch_active(&self, sign: Sign) -> bool {
        let mut inner = self.base.lock();
        self.base
            .core()
            .end_switch_active(&mut inner.machine, &self.switches, sign)
    }

    /// Whether the positive end switch is active.
    pub fn is_positive_reference_active(&self) -> bool {
        self.is_end_switch_active(Sign::Positive)
    }

    /// Whether the negative end switch is active.
    pub fn is_negative_reference_active(&self) -> bool {
        self.is_end_switch_active(Sign::Negative)
    }

    /// Whether the positive end switch is enabled on the controller.
    pub fn is_positive_end_switch_enabled(&self) -> bool {
        self.switches.is_enabled(Sign::Positive)
    }

    /// Whether the negative end switch is enabled on the controller.
    pub fn is_negative_end_switch_enabled(&self) -> bool {
        self.switches.is_enabled(Sign::Negative)
    }

    /// Calibrated positive end-switch position in steps (`i32::MAX` if unknown).
    pub fn get_positive_end_reference_in_steps(&self) -> i32 {
        self.switches.calibrated(Sign::Positive)
    }

    /// Calibrated negative end-switch position in steps (`i32::MIN` if unknown).
    pub fn get_negative_end_reference_in_steps(&self) -> i32 {
        self.switches.calibrated(Sign::Negative)
    }

    /// Calibrated positive end-switch position in user units.
    pub fn get_positive_end_reference(&self) -> f64 {
        self.base.steps_to_units(self.get_positive_end_reference_in_steps())
    }

    /// Calibrated negative end-switch position in user units.
    pub fn get_negative_end_reference(&self) -> f64 {
        self.base.steps_to_units(self.get_negative_end_reference_in_steps())
    }

    /// Standard deviation of the positive end-switch position in steps.
    pub fn get_tolerance_positive_end_switch(&self) -> f64 {
        self.switches.tolerance(Sign::Positive)
    }

    /// Standard deviation of the negative end-switch position in steps.
    pub fn get_tolerance_negative_end_switch(&self) -> f64 {
        self.switches.tolerance(Sign::Negative)
    }

    /// Whether the tolerances are known.
    pub fn tolerance_calculated(&self) -> bool {
        self.switches.tolerance_calculated()
    }

    /// Whether the last calibration failed.
    pub fn calibration_failed(&self) -> bool {
        self.switches.calibration_failed.load(Ordering::Acquire)
    }

    /// Whether the last tolerance run failed.
    pub fn tolerance_calc_failed(&self) -> bool {
        self.switches.tolerance_calc_failed.load(Ordering::Acquire)
    }
}

impl Deref for ReferencedMotor {
    type Target = BasicMotor;

    fn deref(&self) -> &BasicMotor {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::DummyMotorController;
    use crate::error::ErrorMode;
    use crate::motor::MotorState;

    fn referenced(controller: &Arc<DummyMotorController>) -> ReferencedMotor {
        ReferencedMotor::new(controller.clone(), &MotorConfig::new("z")).unwrap()
    }

    #[test]
    fn test_persisted_end_switches_restore_full_calibration() {
        let controller = Arc::new(
            DummyMotorController::new()
                .with_end_switches(-500, 500)
                .with_calibration(1_700_000_000, 0, 1000),
        );
        let motor = referenced(&controller);
        assert_eq!(motor.get_calibration_mode(), CalibrationMode::Full);
        assert_eq!(motor.get_positive_end_reference_in_steps(), 1000);
        assert_eq!(motor.get_negative_end_reference_in_steps(), 0);
        assert!(motor.has_hardware_reference_switches());
    }

    #[test]
    fn test_targets_outside_end_switches_rejected() {
        let controller = Arc::new(
            DummyMotorController::new()
                .with_end_switches(-500, 500)
                .with_calibration(1_700_000_000, 0, 1000),
        );
        let motor = referenced(&controller);
        motor.set_enabled(true);
        assert_eq!(
            motor.set_target_position_in_steps(1001),
            Err(MotorError::InvalidParameter)
        );
        assert_eq!(
            motor.set_target_position_in_steps(-1),
            Err(MotorError::InvalidParameter)
        );
        motor.set_target_position_in_steps(1000).unwrap();
    }

    #[test]
    fn test_set_actual_position_forgets_end_switches() {
        let controller = Arc::new(
            DummyMotorController::new()
                .with_end_switches(-500, 500)
                .with_calibration(1_700_000_000, 0, 1000),
        );
        let motor = referenced(&controller);
        motor.set_actual_position_in_steps(5).unwrap();

        assert_eq!(motor.get_calibration_mode(), CalibrationMode::Simple);
        assert_eq!(motor.get_positive_end_reference_in_steps(), i32::MAX);
        assert_eq!(controller.get_negative_reference_switch_calibration(), i32::MIN);
        assert!(motor.get_calibration_time() > 0);
    }

    #[test]
    fn test_both_switches_read_forces_error() {
        let controller = Arc::new(DummyMotorController::new().with_end_switches(-500, 500));
        let motor = referenced(&controller);
        motor.set_enabled(true);
        motor.set_actual_position_in_steps(0).unwrap();
        motor.set_target_position_in_steps(100).unwrap();
        motor.start();

        controller.force_reference_switches(true, true);
        assert!(motor.is_negative_reference_active());
        assert_eq!(motor.get_error(), ErrorMode::BothEndSwitchesOn);
        assert_eq!(motor.get_state(), MotorState::Error);
    }

    #[test]
    fn test_tolerance_without_full_calibration_fails() {
        let controller = Arc::new(DummyMotorController::new().with_end_switches(-500, 500));
        let motor = referenced(&controller);
        motor.set_enabled(true);
        motor.determine_tolerance().unwrap();

        assert_eq!(motor.wait_for_idle(), MotorState::Idle);
        assert!(motor.tolerance_calc_failed());
        assert!(!motor.tolerance_calculated());
        assert_eq!(motor.get_error(), ErrorMode::CalibrationError);
    }
}
