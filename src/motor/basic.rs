//! Motor with enable/disable/move/stop/error handling.

use core::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use heapless::String;

use crate::config::{validate_motor, MotorConfig, SoftwareLimits, UnitsConverter};
use crate::controller::{DecoderReadoutMode, MotorController};
use crate::error::{ErrorMode, MotorError, Result};
use crate::fsm::{Event, StateMachine};

use super::actions::{calibration_timestamp, rewrite_positions, MotorCore, Variant};
use super::shared::SharedState;
use super::state::{events, CalibrationMode, MotorState, Sign};
use super::task::BackgroundTask;

/// A stepper motor driven through a [`MotorController`].
///
/// Every public operation takes the motor lock. Background work (a move in flight on the
/// controller, a calibration thread) finishes on its own, but the motor only notices on
/// its next poll: any state query such as [`get_state`](Self::get_state),
/// [`is_system_idle`](Self::is_system_idle) or [`wait_for_idle`](Self::wait_for_idle)
/// advances the state machine.
///
/// Rejections are reported synchronously as [`MotorError`] and never change the motor.
/// Faults that happen later are recorded as an [`ErrorMode`], read with
/// [`get_error`](Self::get_error) and cleared with [`reset_error`](Self::reset_error).
pub struct BasicMotor {
    core: MotorCore,
    inner: Mutex<Inner>,
}

/// State guarded by the motor lock.
pub(crate) struct Inner {
    pub(crate) machine: StateMachine<MotorCore>,
    name: String<32>,
    limits: SoftwareLimits,
    autostart: bool,
    motor_converter: Box<dyn UnitsConverter>,
    encoder_converter: Box<dyn UnitsConverter>,
    encoder_position_offset: i32,
}

impl BasicMotor {
    /// Create a motor from its configuration.
    ///
    /// The motor starts `disabled` with the motor current off. A non-zero calibration
    /// time stored on the controller restores a `Simple` calibration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(controller: Arc<dyn MotorController>, config: &MotorConfig) -> Result<Self> {
        let mode = if controller.get_calibration_time() != 0 {
            CalibrationMode::Simple
        } else {
            CalibrationMode::None
        };
        Self::assemble(controller, config, Variant::Basic, mode)
    }

    pub(crate) fn assemble(
        controller: Arc<dyn MotorController>,
        config: &MotorConfig,
        variant: Variant,
        calibration_mode: CalibrationMode,
    ) -> Result<Self> {
        validate_motor(config)?;
        let motor_converter = Box::new(config.motor_converter()?);
        let encoder_converter = Box::new(config.encoder_converter()?);

        let shared = SharedState::new(controller.get_actual_position(), calibration_mode);
        let core = MotorCore {
            controller,
            shared: Arc::new(shared),
            variant,
            task: BackgroundTask::default(),
            poll_interval: config.poll_interval(),
        };

        let mut machine = core.state_machine();
        machine.process_event(&core, events::INITIAL);

        tracing::debug!(
            motor = %config.name,
            device = %config.device,
            ?calibration_mode,
            "motor created"
        );

        Ok(Self {
            core,
            inner: Mutex::new(Inner {
                machine,
                name: config.name.clone(),
                limits: config.software_limits(),
                autostart: config.autostart,
                motor_converter,
                encoder_converter,
                encoder_position_offset: 0,
            }),
        })
    }

    pub(crate) fn core(&self) -> &MotorCore {
        &self.core
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fire queued errors, run the poll action and return the state.
    pub(crate) fn poll(&self, inner: &mut Inner) -> MotorState {
        self.core.fire_requested_error(&mut inner.machine);
        inner.machine.current_state(&self.core)
    }

    /// Reject the call if a move, calibration or tolerance run is active.
    pub(crate) fn ensure_inactive(&self, inner: &mut Inner) -> Result<(), MotorError> {
        if self.poll(inner).is_active() {
            return Err(MotorError::SystemInAction);
        }
        Ok(())
    }

    pub(crate) fn fire(&self, inner: &mut Inner, event: Event) {
        self.core.fire_requested_error(&mut inner.machine);
        inner.machine.process_event(&self.core, event);
    }

    fn check_new_position(&self, inner: &Inner, steps: i32) -> Result<(), MotorError> {
        if self.core.shared.calibration_mode() == CalibrationMode::None {
            return Err(MotorError::SystemNotCalibrated);
        }
        if !inner.limits.allows(steps) || !self.core.within_end_switches(steps) {
            return Err(MotorError::InvalidParameter);
        }
        Ok(())
    }

    pub(crate) fn steps_to_units(&self, steps: i32) -> f64 {
        self.lock().motor_converter.steps_to_units(steps)
    }

    /// Motor name.
    pub fn name(&self) -> String<32> {
        self.lock().name.clone()
    }

    // ---- motion ----

    /// Move by `delta` steps relative to the actual position.
    ///
    /// # Errors
    ///
    /// `SystemInAction` while active, `SystemNotCalibrated` without a calibration,
    /// `InvalidParameter` if the new target violates a limit.
    pub fn move_relative_in_steps(&self, delta: i32) -> Result<(), MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;

        let target = self
            .core
            .controller
            .get_actual_position()
            .checked_add(delta)
            .ok_or(MotorError::InvalidParameter)?;
        self.check_new_position(&inner, target)?;

        self.core.shared.set_target(target);
        tracing::debug!(motor = %inner.name, delta, target, "relative move");
        self.fire(&mut inner, events::MOVE);
        Ok(())
    }

    /// Move by `delta` user units.
    pub fn move_relative(&self, delta: f64) -> Result<(), MotorError> {
        let steps = self.lock().motor_converter.units_to_steps(delta);
        self.move_relative_in_steps(steps)
    }

    /// Set a new target position in steps.
    ///
    /// While idle the target is stored and, with autostart, the move starts right away.
    /// While moving with autostart the running move is retargeted.
    ///
    /// # Errors
    ///
    /// `SystemInAction` while calibrating, calculating the tolerance, or moving without
    /// autostart. Otherwise the same validation as [`move_relative_in_steps`].
    ///
    /// [`move_relative_in_steps`]: Self::move_relative_in_steps
    pub fn set_target_position_in_steps(&self, steps: i32) -> Result<(), MotorError> {
        let mut inner = self.lock();
        let state = self.poll(&mut inner);
        let retarget = state == MotorState::Moving && inner.autostart;
        if state.is_active() && !retarget {
            return Err(MotorError::SystemInAction);
        }
        self.check_new_position(&inner, steps)?;

        self.core.shared.set_target(steps);
        if retarget {
            tracing::debug!(motor = %inner.name, target = steps, "retarget");
            self.core.controller.set_target_position(steps);
        } else if inner.autostart {
            self.fire(&mut inner, events::MOVE);
        }
        Ok(())
    }

    /// Set a new target position in user units.
    pub fn set_target_position(&self, units: f64) -> Result<(), MotorError> {
        let steps = self.lock().motor_converter.units_to_steps(units);
        self.set_target_position_in_steps(steps)
    }

    /// Start moving to the stored target.
    pub fn start(&self) {
        let mut inner = self.lock();
        self.fire(&mut inner, events::MOVE);
    }

    /// Stop the current action. The motor reaches `idle` once it is at rest.
    pub fn stop(&self) {
        let mut inner = self.lock();
        self.fire(&mut inner, events::STOP);
    }

    /// Cut motor current, drop the calibration and record `EmergencyStop`.
    pub fn emergency_stop(&self) {
        let mut inner = self.lock();
        self.fire(&mut inner, events::EMERGENCY_STOP);
    }

    /// Clear the recorded fault and leave `error`.
    ///
    /// The motor returns to `idle` if its current is still on, to `disabled` otherwise.
    pub fn reset_error(&self) {
        let mut inner = self.lock();
        self.core.shared.set_error_mode(ErrorMode::NoError);
        let event = if self.core.controller.is_motor_current_enabled() {
            events::RESET_TO_IDLE
        } else {
            events::RESET_TO_DISABLE
        };
        self.fire(&mut inner, event);
    }

    /// Power the motor up or down.
    pub fn set_enabled(&self, enable: bool) {
        let mut inner = self.lock();
        let event = if enable {
            events::ENABLE
        } else {
            events::DISABLE
        };
        self.fire(&mut inner, event);
    }

    /// Whether the controller reports the driver as enabled.
    pub fn is_enabled(&self) -> bool {
        let _inner = self.lock();
        self.core.controller.is_enabled()
    }

    // ---- coordinates ----

    /// Declare the current position to be `steps`.
    ///
    /// Sets a `Simple` calibration and forgets any end-switch calibration.
    pub fn set_actual_position_in_steps(&self, steps: i32) -> Result<(), MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;

        let controller = self.core.controller.as_ref();
        rewrite_positions(controller, steps, steps);
        self.core.shared.set_target(steps);

        if let Variant::Referenced(switches) = &self.core.variant {
            switches.clear_calibration();
            controller.set_positive_reference_switch_calibration(i32::MAX);
            controller.set_negative_reference_switch_calibration(i32::MIN);
        }
        self.core.shared.set_calibration_mode(CalibrationMode::Simple);
        controller.set_calibration_time(calibration_timestamp());

        tracing::info!(motor = %inner.name, position = steps, "actual position set");
        Ok(())
    }

    /// Declare the current position to be `units`.
    pub fn set_actual_position(&self, units: f64) -> Result<(), MotorError> {
        let steps = self.lock().motor_converter.units_to_steps(units);
        self.set_actual_position_in_steps(steps)
    }

    /// Shift the coordinate system by `delta` steps.
    ///
    /// Actual and target position, the software limits and calibrated end switches all
    /// move by `delta`. Limits and end switches that are unbounded stay unbounded.
    ///
    /// # Errors
    ///
    /// `SystemInAction` while active. `InvalidParameter` if a finite value would leave
    /// the step range; nothing is changed in that case.
    pub fn translate_axis_in_steps(&self, delta: i32) -> Result<(), MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;

        let controller = self.core.controller.as_ref();
        let overflow = MotorError::InvalidParameter;
        let actual = controller
            .get_actual_position()
            .checked_add(delta)
            .ok_or(overflow)?;
        let target = self.core.shared.target().checked_add(delta).ok_or(overflow)?;
        let limits = inner.limits.translated(delta).ok_or(overflow)?;

        let switches = match &self.core.variant {
            Variant::Basic => None,
            Variant::Referenced(switches) => {
                let negative = shift(switches.calibrated(Sign::Negative), i32::MIN, delta)
                    .ok_or(overflow)?;
                let positive = shift(switches.calibrated(Sign::Positive), i32::MAX, delta)
                    .ok_or(overflow)?;
                Some((switches, negative, positive))
            }
        };

        rewrite_positions(controller, actual, target);
        self.core.shared.set_target(target);
        inner.limits = limits;
        if let Some((switches, negative, positive)) = switches {
            switches.set_calibrated(negative, positive);
            controller.set_negative_reference_switch_calibration(negative);
            controller.set_positive_reference_switch_calibration(positive);
        }

        tracing::info!(motor = %inner.name, delta, "axis translated");
        Ok(())
    }

    /// Shift the coordinate system by `delta` user units.
    pub fn translate_axis(&self, delta: f64) -> Result<(), MotorError> {
        let steps = self.lock().motor_converter.units_to_steps(delta);
        self.translate_axis_in_steps(steps)
    }

    /// Actual position in steps.
    pub fn get_current_position_in_steps(&self) -> i32 {
        let _inner = self.lock();
        self.core.controller.get_actual_position()
    }

    /// Actual position in user units.
    pub fn get_current_position(&self) -> f64 {
        let inner = self.lock();
        inner
            .motor_converter
            .steps_to_units(self.core.controller.get_actual_position())
    }

    /// Last commanded target in steps.
    pub fn get_target_position_in_steps(&self) -> i32 {
        let _inner = self.lock();
        self.core.shared.target()
    }

    /// Last commanded target in user units.
    pub fn get_target_position(&self) -> f64 {
        let inner = self.lock();
        inner.motor_converter.steps_to_units(self.core.shared.target())
    }

    // ---- software limits ----

    /// Set the lower software limit in steps. It must stay below the upper limit.
    pub fn set_min_position_limit_in_steps(&self, steps: i32) -> Result<(), MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;
        if steps >= inner.limits.max_steps {
            return Err(MotorError::InvalidParameter);
        }
        inner.limits.min_steps = steps;
        Ok(())
    }

    /// Set the lower software limit in user units.
    pub fn set_min_position_limit(&self, units: f64) -> Result<(), MotorError> {
        let steps = self.lock().motor_converter.units_to_steps(units);
        self.set_min_position_limit_in_steps(steps)
    }

    /// Set the upper software limit in steps. It must stay above the lower limit.
    pub fn set_max_position_limit_in_steps(&self, steps: i32) -> Result<(), MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;
        if steps <= inner.limits.min_steps {
            return Err(MotorError::InvalidParameter);
        }
        inner.limits.max_steps = steps;
        Ok(())
    }

    /// Set the upper software limit in user units.
    pub fn set_max_position_limit(&self, units: f64) -> Result<(), MotorError> {
        let steps = self.lock().motor_converter.units_to_steps(units);
        self.set_max_position_limit_in_steps(steps)
    }

    /// Lower software limit in steps.
    pub fn get_min_position_limit_in_steps(&self) -> i32 {
        self.lock().limits.min_steps
    }

    /// Lower software limit in user units.
    pub fn get_min_position_limit(&self) -> f64 {
        let inner = self.lock();
        inner.motor_converter.steps_to_units(inner.limits.min_steps)
    }

    /// Upper software limit in steps.
    pub fn get_max_position_limit_in_steps(&self) -> i32 {
        self.lock().limits.max_steps
    }

    /// Upper software limit in user units.
    pub fn get_max_position_limit(&self) -> f64 {
        let inner = self.lock();
        inner.motor_converter.steps_to_units(inner.limits.max_steps)
    }

    /// Enforce or ignore the software limits.
    pub fn set_software_limits_enabled(&self, enabled: bool) -> Result<(), MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;
        inner.limits.enabled = enabled;
        Ok(())
    }

    /// Whether the software limits are enforced.
    pub fn get_software_limits_enabled(&self) -> bool {
        self.lock().limits.enabled
    }

    /// Current software limits.
    pub fn get_software_limits(&self) -> SoftwareLimits {
        self.lock().limits
    }

    // ---- settings ----

    /// Start moves as soon as a target is set.
    pub fn set_autostart(&self, autostart: bool) -> Result<(), MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;
        inner.autostart = autostart;
        Ok(())
    }

    /// Whether setting a target starts the move.
    pub fn get_autostart(&self) -> bool {
        self.lock().autostart
    }

    /// Replace the motor-steps converter.
    pub fn set_steps_to_units_converter(
        &self,
        converter: Box<dyn UnitsConverter>,
    ) -> Result<(), MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;
        inner.motor_converter = converter;
        Ok(())
    }

    /// Replace the encoder-steps converter.
    pub fn set_encoder_steps_to_units_converter(
        &self,
        converter: Box<dyn UnitsConverter>,
    ) -> Result<(), MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;
        inner.encoder_converter = converter;
        Ok(())
    }

    // ---- encoder ----

    /// Encoder position in user units, offset applied.
    pub fn get_encoder_position(&self) -> f64 {
        let inner = self.lock();
        let steps = self
            .core
            .controller
            .get_decoder_position()
            .saturating_add(inner.encoder_position_offset);
        inner.encoder_converter.steps_to_units(steps)
    }

    /// Adjust the encoder offset so that the encoder reads `units` now.
    pub fn set_actual_encoder_position(&self, units: f64) {
        let mut inner = self.lock();
        let steps = inner.encoder_converter.units_to_steps(units);
        inner.encoder_position_offset =
            steps.saturating_sub(self.core.controller.get_decoder_position());
    }

    /// Decoder readout mode of the controller.
    pub fn get_encoder_readout_mode(&self) -> DecoderReadoutMode {
        let _inner = self.lock();
        self.core.controller.get_decoder_readout_mode()
    }

    // ---- speed and current ----

    /// Set the user speed limit; returns the value the controller applied.
    pub fn set_user_speed_limit(&self, limit: f64) -> Result<f64, MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;
        Ok(self.core.controller.set_user_speed_limit(limit))
    }

    /// Current user speed limit.
    pub fn get_user_speed_limit(&self) -> f64 {
        let _inner = self.lock();
        self.core.controller.get_user_speed_limit()
    }

    /// Highest speed the controller supports.
    pub fn get_max_speed_capability(&self) -> f64 {
        let _inner = self.lock();
        self.core.controller.get_max_speed_capability()
    }

    /// Set the user current limit; returns the value the controller applied.
    pub fn set_user_current_limit(&self, limit: f64) -> Result<f64, MotorError> {
        let mut inner = self.lock();
        self.ensure_inactive(&mut inner)?;
        Ok(self.core.controller.set_user_current_limit(limit))
    }

    /// Current user current limit.
    pub fn get_user_current_limit(&self) -> f64 {
        let _inner = self.lock();
        self.core.controller.get_user_current_limit()
    }

    /// Highest current the controller can safely drive.
    pub fn get_safe_current_limit(&self) -> f64 {
        let _inner = self.lock();
        self.core.controller.get_max_current_limit()
    }

    // ---- status ----

    /// Recorded fault.
    pub fn get_error(&self) -> ErrorMode {
        let _inner = self.lock();
        self.core.shared.error_mode()
    }

    /// Whether a zero point is known.
    pub fn is_calibrated(&self) -> bool {
        self.get_calibration_mode() != CalibrationMode::None
    }

    /// How much of the axis is referenced.
    pub fn get_calibration_mode(&self) -> CalibrationMode {
        let _inner = self.lock();
        self.core.shared.calibration_mode()
    }

    /// Calibration timestamp stored on the controller (0 = uncalibrated).
    pub fn get_calibration_time(&self) -> u32 {
        let _inner = self.lock();
        self.core.controller.get_calibration_time()
    }

    /// Whether end switches take part in motion checks and calibration.
    pub fn has_hardware_reference_switches(&self) -> bool {
        matches!(self.core.variant, Variant::Referenced(_))
    }

    /// Current state, after letting finished actions complete.
    pub fn get_state(&self) -> MotorState {
        let mut inner = self.lock();
        self.poll(&mut inner)
    }

    /// Whether a move is in flight.
    pub fn is_moving(&self) -> bool {
        self.get_state() == MotorState::Moving
    }

    /// Whether the motor is `idle` or `disabled`.
    pub fn is_system_idle(&self) -> bool {
        self.get_state().is_idle()
    }

    /// Poll until the motor is `idle`, `disabled` or `error`, and return that state.
    pub fn wait_for_idle(&self) -> MotorState {
        loop {
            let state = self.get_state();
            if state.is_idle() || state == MotorState::Error {
                return state;
            }
            thread::sleep(self.core.poll_interval);
        }
    }
}

impl fmt::Debug for BasicMotor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("BasicMotor")
            .field("name", &inner.name)
            .field("machine", &inner.machine)
            .field("variant", &self.core.variant)
            .field("limits", &inner.limits)
            .field("autostart", &inner.autostart)
            .finish_non_exhaustive()
    }
}

/// Shift a position that may sit at its unbounded sentinel.
fn shift(value: i32, sentinel: i32, delta: i32) -> Option<i32> {
    if value == sentinel {
        Some(value)
    } else {
        value.checked_add(delta)
    }
}
