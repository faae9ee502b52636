//! Transition tables and actions shared by the basic and referenced motors.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::controller::MotorController;
use crate::error::ErrorMode;
use crate::fsm::{Actions, State, StateMachine, Transition};

use super::calibration::Worker;
use super::shared::{read_end_switch, EndSwitchState, SharedState};
use super::state::{events, CalibrationMode, MotorState, Sign};
use super::task::BackgroundTask;

/// Entry actions of the motor tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryAction {
    /// Motor current and end-switch power off.
    PowerDown,
    /// Motor current and end-switch power on.
    Enable,
    /// Round to a full step, stop, then power down.
    Disable,
    /// Push the stored target to the controller.
    StartMove,
    /// Pin the controller target to the actual position.
    Stop,
    /// Cut power, drop the calibration and record the fault.
    EmergencyStop,
    /// Spawn the calibration action.
    StartCalibration,
    /// Spawn the tolerance action.
    StartToleranceCalculation,
    /// Ask the background action to stop.
    CancelTask,
}

/// Poll actions of the motor tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollAction {
    /// Wait until the controller reports standstill, then decide the outcome of the move.
    WaitForStandstill,
    /// Wait until the background action clears the async flag.
    AwaitBackgroundTask,
}

/// Basic or referenced behaviour, fixed at construction.
#[derive(Debug)]
pub(crate) enum Variant {
    Basic,
    Referenced(Arc<EndSwitchState>),
}

/// Everything the actions need; lives outside the motor lock.
pub(crate) struct MotorCore {
    pub(crate) controller: Arc<dyn MotorController>,
    pub(crate) shared: Arc<SharedState>,
    pub(crate) variant: Variant,
    pub(crate) task: BackgroundTask,
    pub(crate) poll_interval: Duration,
}

impl MotorCore {
    /// Build the state machine for this variant, still in `init`.
    pub(crate) fn state_machine(&self) -> StateMachine<MotorCore> {
        let referenced = matches!(self.variant, Variant::Referenced(_));
        StateMachine::new(MotorState::Init, transition_table(referenced))
    }

    /// Whether `steps` is inside the calibrated end switches (always true for a basic motor).
    pub(crate) fn within_end_switches(&self, steps: i32) -> bool {
        match &self.variant {
            Variant::Basic => true,
            Variant::Referenced(switches) => switches.contains(steps),
        }
    }

    /// Read an end switch while holding the motor lock.
    ///
    /// Both switches active fires the `error` event right away.
    pub(crate) fn end_switch_active(
        &self,
        machine: &mut StateMachine<MotorCore>,
        switches: &EndSwitchState,
        sign: Sign,
    ) -> bool {
        let reading = read_end_switch(self.controller.as_ref(), &self.shared, switches, sign);
        self.fire_requested_error(machine);
        reading.active
    }

    /// Fire the `error` event if a background action or switch read asked for it.
    pub(crate) fn fire_requested_error(&self, machine: &mut StateMachine<MotorCore>) {
        if self.shared.take_error_request() {
            machine.process_event(self, events::ERROR);
        }
    }

    /// Pin the target to the actual position.
    fn halt(&self) {
        let actual = self.controller.get_actual_position();
        self.controller.set_target_position(actual);
        self.shared.set_target(actual);
    }

    fn power(&self, enable: bool) {
        self.controller.set_motor_current_enabled(enable);
        self.controller.set_end_switch_power_enabled(enable);
    }

    fn disable(&self) {
        let full_stepping = self.controller.is_full_stepping();
        if !full_stepping {
            self.controller.enable_full_stepping(true);
        }
        self.halt();
        if !full_stepping {
            self.controller.enable_full_stepping(false);
        }
        self.power(false);
    }

    fn emergency_stop(&self) {
        self.task.cancel();
        self.power(false);
        self.halt();
        self.controller.set_calibration_time(0);
        self.shared.set_calibration_mode(CalibrationMode::None);
        self.shared.set_error_mode(ErrorMode::EmergencyStop);
        tracing::warn!("emergency stop");
    }

    fn start_background(&self, machine: &mut StateMachine<MotorCore>, tolerance: bool) {
        let Variant::Referenced(switches) = &self.variant else {
            return;
        };

        machine.set_async_active(true);
        let worker = Worker {
            controller: Arc::clone(&self.controller),
            shared: Arc::clone(&self.shared),
            switches: Arc::clone(switches),
            poll_interval: self.poll_interval,
        };
        let done = machine.async_flag();
        let spawned = if tolerance {
            self.task.spawn("determine-tolerance", move |cancel| {
                worker.determine_tolerance(cancel, done)
            })
        } else {
            self.task
                .spawn("calibrate", move |cancel| worker.calibrate(cancel, done))
        };

        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to start background action");
            if tolerance {
                switches.tolerance_calc_failed.store(true, Ordering::Release);
            } else {
                switches.calibration_failed.store(true, Ordering::Release);
            }
            self.shared.set_error_mode(ErrorMode::ActionError);
            machine.set_async_active(false);
        }
    }

    /// Whether a finished move ended where it should.
    fn move_succeeded(&self, machine: &mut StateMachine<MotorCore>) -> bool {
        if self.controller.get_actual_position() == self.shared.target() {
            return true;
        }
        match &self.variant {
            Variant::Basic => false,
            Variant::Referenced(switches) => {
                self.end_switch_active(machine, switches, Sign::Positive)
                    || self.end_switch_active(machine, switches, Sign::Negative)
            }
        }
    }

    fn wait_for_standstill(&self, machine: &mut StateMachine<MotorCore>) {
        if self.controller.is_motor_moving() {
            return;
        }
        machine.set_async_active(false);
        if machine.apply_requested() {
            return;
        }

        let succeeded = self.move_succeeded(machine);
        if machine.peek_state() != MotorState::Moving {
            // A switch read already forced the error transition.
            return;
        }
        if succeeded {
            machine.process_event(self, events::STOP);
        } else {
            tracing::warn!(
                actual = self.controller.get_actual_position(),
                target = self.shared.target(),
                "move interrupted"
            );
            self.shared.set_error_mode(ErrorMode::MoveInterrupted);
            self.halt();
            machine.process_event(self, events::ERROR);
        }
    }

    fn await_background_task(&self, machine: &mut StateMachine<MotorCore>) {
        if machine.is_async_active() {
            return;
        }
        if machine.apply_requested() {
            return;
        }
        machine.process_event(self, events::STOP);
    }
}

impl Actions for MotorCore {
    type State = MotorState;
    type Entry = EntryAction;
    type Poll = PollAction;

    fn on_entry(&self, machine: &mut StateMachine<Self>, action: EntryAction) {
        match action {
            EntryAction::PowerDown => self.power(false),
            EntryAction::Enable => self.power(true),
            EntryAction::Disable => self.disable(),
            EntryAction::StartMove => {
                self.controller.set_target_position(self.shared.target());
                machine.set_async_active(true);
            }
            EntryAction::Stop => self.halt(),
            EntryAction::EmergencyStop => self.emergency_stop(),
            EntryAction::StartCalibration => self.start_background(machine, false),
            EntryAction::StartToleranceCalculation => self.start_background(machine, true),
            EntryAction::CancelTask => self.task.cancel(),
        }
    }

    fn on_poll(&self, machine: &mut StateMachine<Self>, action: PollAction) {
        match action {
            PollAction::WaitForStandstill => self.wait_for_standstill(machine),
            PollAction::AwaitBackgroundTask => self.await_background_task(machine),
        }
    }
}

fn transition_table(referenced: bool) -> Vec<State<MotorCore>> {
    use EntryAction as E;
    use MotorState as S;
    use PollAction as P;

    let to = Transition::<MotorCore>::new;

    let mut idle = State::new(S::Idle)
        .on(to(events::MOVE, S::Moving)
            .entry(E::StartMove)
            .poll(P::WaitForStandstill))
        .on(to(events::DISABLE, S::Disabled).entry(E::Disable));

    let mut states = vec![
        State::new(S::Init).on(to(events::INITIAL, S::Disabled).entry(E::PowerDown)),
        State::new(S::Disabled).on(to(events::ENABLE, S::Idle).entry(E::Enable)),
        State::new(S::Moving)
            .on(to(events::STOP, S::Idle).entry(E::Stop))
            .on(to(events::ERROR, S::Error))
            .on(to(events::EMERGENCY_STOP, S::Error).entry(E::EmergencyStop))
            .on(to(events::DISABLE, S::Disabled).entry(E::Disable)),
        State::new(S::Error)
            .on(to(events::RESET_TO_IDLE, S::Idle))
            .on(to(events::RESET_TO_DISABLE, S::Disabled)),
    ];

    if referenced {
        idle = idle
            .on(to(events::CALIBRATE, S::Calibrating)
                .entry(E::StartCalibration)
                .poll(P::AwaitBackgroundTask))
            .on(to(events::DETERMINE_TOLERANCE, S::CalculatingTolerance)
                .entry(E::StartToleranceCalculation)
                .poll(P::AwaitBackgroundTask));

        for id in [S::Calibrating, S::CalculatingTolerance] {
            states.push(
                State::new(id)
                    .on(to(events::STOP, S::Idle).entry(E::CancelTask))
                    .on(to(events::ERROR, S::Error).entry(E::CancelTask))
                    .on(to(events::EMERGENCY_STOP, S::Error).entry(E::EmergencyStop)),
            );
        }
    }

    states.push(idle);
    states
}

/// Overwrite actual and target position with the motor current briefly off.
pub(crate) fn rewrite_positions(controller: &dyn MotorController, actual: i32, target: i32) {
    let enabled = controller.is_motor_current_enabled();
    controller.set_motor_current_enabled(false);
    controller.set_actual_position(actual);
    controller.set_target_position(target);
    controller.set_motor_current_enabled(enabled);
}

/// Calibration timestamp: seconds since the epoch, never 0.
pub(crate) fn calibration_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or(1)
        .max(1)
}
