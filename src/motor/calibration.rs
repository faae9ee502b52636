//! End-switch calibration and tolerance estimation.
//!
//! Both run on a background thread that never takes the motor lock. They talk to the
//! controller directly, publish their results through atomics and clear the async flag
//! when they return; the state machine notices on its next poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::controller::MotorController;
use crate::error::ErrorMode;

use super::actions::{calibration_timestamp, rewrite_positions};
use super::shared::{read_end_switch, EndSwitchState, SharedState};
use super::state::{CalibrationMode, Sign};
use super::task::{AsyncDone, CancelToken};

/// Steps commanded beyond the current position while searching an end switch.
pub const END_SWITCH_SEARCH_STEPS: i32 = 50_000;

/// Distance from the calibrated end switch at which each tolerance sample starts.
pub const TOLERANCE_APPROACH_STEPS: i32 = 1_000;

/// Samples taken per end switch when estimating the tolerance.
pub const TOLERANCE_SAMPLES: usize = 10;

/// Why a background action gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interruption {
    /// `stop()` or `emergency_stop()` was requested.
    Stopped,
    /// The motor came to rest somewhere unexpected.
    MoveInterrupted,
    /// Both end switches were active at once.
    BothEndSwitches,
    /// The calibrated span does not fit the step range.
    Overflow,
}

/// Context of one background action.
pub(crate) struct Worker {
    pub(crate) controller: Arc<dyn MotorController>,
    pub(crate) shared: Arc<SharedState>,
    pub(crate) switches: Arc<EndSwitchState>,
    pub(crate) poll_interval: Duration,
}

impl Worker {
    /// Learn both end-switch positions and re-zero the axis on the negative one.
    pub(crate) fn calibrate(self, cancel: CancelToken, done: Arc<AtomicBool>) {
        let _done = AsyncDone(done);
        let switches = &self.switches;
        switches.tolerance_calculated.store(false, Ordering::Release);
        switches.calibration_failed.store(false, Ordering::Release);

        if !switches.both_enabled() {
            tracing::warn!("calibration needs both end switches enabled");
            self.controller.set_calibration_time(0);
            self.shared.set_calibration_mode(CalibrationMode::None);
            switches.calibration_failed.store(true, Ordering::Release);
            return;
        }

        let result = self
            .find_end_switch(&cancel, Sign::Positive)
            .and_then(|positive| {
                let negative = self.find_end_switch(&cancel, Sign::Negative)?;
                Ok((negative, positive))
            })
            .and_then(|(negative, positive)| {
                self.apply_calibration(&cancel, negative, positive)
            });

        if let Err(reason) = result {
            tracing::warn!(?reason, "calibration failed");
            self.halt();
            self.controller.set_calibration_time(0);
            self.shared.set_calibration_mode(CalibrationMode::None);
            self.shared
                .set_error_mode_if_clear(ErrorMode::CalibrationError);
            switches.calibration_failed.store(true, Ordering::Release);
        }
    }

    /// Sample both end switches and store the standard deviation of where they trigger.
    pub(crate) fn determine_tolerance(self, cancel: CancelToken, done: Arc<AtomicBool>) {
        let _done = AsyncDone(done);
        let switches = &self.switches;
        switches.tolerance_calc_failed.store(false, Ordering::Release);

        if self.shared.calibration_mode() != CalibrationMode::Full {
            tracing::warn!("tolerance calculation needs a full calibration");
            self.fail_tolerance();
            return;
        }

        let result = self
            .sample_end_switch(&cancel, Sign::Positive)
            .and_then(|positive| Ok((self.sample_end_switch(&cancel, Sign::Negative)?, positive)));

        match result {
            Ok((negative, positive)) => {
                switches.set_tolerances(negative, positive);
                switches.tolerance_calculated.store(true, Ordering::Release);
                tracing::info!(negative, positive, "end-switch tolerance determined");
            }
            Err(reason) => {
                tracing::warn!(?reason, "tolerance calculation failed");
                self.halt();
                self.fail_tolerance();
            }
        }
    }

    fn fail_tolerance(&self) {
        self.switches
            .tolerance_calc_failed
            .store(true, Ordering::Release);
        self.shared
            .set_error_mode_if_clear(ErrorMode::CalibrationError);
    }

    /// Keep offsetting the target towards `sign` until its end switch triggers.
    ///
    /// A standstill short of the target just starts the next offset. Reaching the target,
    /// or coming to rest without progress, with the switch still inactive is a stall.
    fn find_end_switch(&self, cancel: &CancelToken, sign: Sign) -> Result<i32, Interruption> {
        let mut stalled = false;
        while !self.end_switch_active(sign)? {
            if stalled {
                return Err(Interruption::MoveInterrupted);
            }
            if cancel.is_cancelled() {
                return Err(Interruption::Stopped);
            }

            let start = self.controller.get_actual_position();
            let target = start.saturating_add(sign.value() * END_SWITCH_SEARCH_STEPS);
            self.command(target);
            self.wait_for_standstill(cancel)?;

            let actual = self.controller.get_actual_position();
            stalled = actual == self.controller.get_target_position() || actual == start;
        }
        if cancel.is_cancelled() {
            return Err(Interruption::Stopped);
        }

        let position = self.controller.get_actual_position();
        tracing::debug!(?sign, position, "end switch found");
        Ok(position)
    }

    fn apply_calibration(
        &self,
        cancel: &CancelToken,
        negative: i32,
        positive: i32,
    ) -> Result<(), Interruption> {
        if cancel.is_cancelled() {
            return Err(Interruption::Stopped);
        }
        let span = positive.checked_sub(negative).ok_or(Interruption::Overflow)?;

        self.switches.set_calibrated(0, span);
        self.controller.set_positive_reference_switch_calibration(span);
        self.controller.set_negative_reference_switch_calibration(0);
        self.controller.set_calibration_time(calibration_timestamp());

        rewrite_positions(self.controller.as_ref(), 0, 0);
        self.shared.set_target(0);
        self.shared.set_calibration_mode(CalibrationMode::Full);
        tracing::info!(negative, positive, span, "calibration finished");
        Ok(())
    }

    fn sample_end_switch(&self, cancel: &CancelToken, sign: Sign) -> Result<f64, Interruption> {
        let calibrated = self.switches.calibrated(sign);
        let approach = sign.value() * TOLERANCE_APPROACH_STEPS;
        let mut samples: heapless::Vec<i32, TOLERANCE_SAMPLES> = heapless::Vec::new();

        while !samples.is_full() {
            if cancel.is_cancelled() {
                return Err(Interruption::Stopped);
            }

            let start = calibrated.saturating_sub(approach);
            self.command(start);
            self.wait_for_standstill(cancel)?;
            if self.controller.get_actual_position() != start {
                return Err(Interruption::MoveInterrupted);
            }

            self.command(calibrated.saturating_add(approach));
            self.wait_for_standstill(cancel)?;
            if !self.end_switch_active(sign)? {
                return Err(Interruption::MoveInterrupted);
            }

            let _ = samples.push(self.controller.get_actual_position());
        }

        let (mean, std_dev) = mean_and_std_dev(&samples);
        tracing::debug!(?sign, calibrated, mean, std_dev, "end switch sampled");
        Ok(std_dev)
    }

    fn end_switch_active(&self, sign: Sign) -> Result<bool, Interruption> {
        let reading = read_end_switch(
            self.controller.as_ref(),
            &self.shared,
            &self.switches,
            sign,
        );
        if reading.both_active {
            return Err(Interruption::BothEndSwitches);
        }
        Ok(reading.active)
    }

    fn command(&self, target: i32) {
        self.shared.set_target(target);
        self.controller.set_target_position(target);
    }

    fn halt(&self) {
        let actual = self.controller.get_actual_position();
        self.command(actual);
    }

    fn wait_for_standstill(&self, cancel: &CancelToken) -> Result<(), Interruption> {
        while self.controller.is_motor_moving() {
            if cancel.is_cancelled() {
                return Err(Interruption::Stopped);
            }
            thread::sleep(self.poll_interval);
        }
        if cancel.is_cancelled() {
            return Err(Interruption::Stopped);
        }
        Ok(())
    }
}

/// Sample mean and sample standard deviation (`N - 1` in the denominator).
///
/// Fewer than two samples have a standard deviation of zero.
pub fn mean_and_std_dev(samples: &[i32]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&s| f64::from(s)).sum::<f64>() / n;
    if samples.len() < 2 {
        return (mean, 0.0);
    }
    let variance: f64 = samples
        .iter()
        .map(|&s| {
            let d = f64::from(s) - mean;
            d * d / (n - 1.0)
        })
        .sum();
    (mean, libm::sqrt(variance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::DummyMotorController;
    use crate::error::ErrorMode;
    use proptest::prelude::*;

    fn worker(controller: &Arc<DummyMotorController>) -> Worker {
        Worker {
            controller: controller.clone(),
            shared: Arc::new(SharedState::new(0, CalibrationMode::None)),
            switches: Arc::new(EndSwitchState::new(true, true)),
            poll_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_cancelled_run_does_not_apply_calibration() {
        let controller = Arc::new(DummyMotorController::new().with_end_switches(-100, 100));
        let worker = worker(&controller);

        let result = worker.apply_calibration(&CancelToken::new(true), -100, 100);
        assert_eq!(result, Err(Interruption::Stopped));
        assert_eq!(worker.shared.calibration_mode(), CalibrationMode::None);
        assert_eq!(worker.switches.calibrated(Sign::Positive), i32::MAX);
        assert_eq!(controller.get_positive_reference_switch_calibration(), i32::MAX);
        assert_eq!(controller.get_calibration_time(), 0);
    }

    #[test]
    fn test_cancelled_run_on_active_switch_is_stopped() {
        let controller = Arc::new(DummyMotorController::new().with_end_switches(-100, 100));
        controller.set_physical_position(100);
        let worker = worker(&controller);

        let result = worker.find_end_switch(&CancelToken::new(true), Sign::Positive);
        assert_eq!(result, Err(Interruption::Stopped));
    }

    #[test]
    fn test_search_resumes_after_short_standstill() {
        let controller = Arc::new(
            DummyMotorController::new()
                .with_end_switches(-10_000, 10_000)
                .with_auto_step(500)
                .with_pause_at(2000),
        );
        controller.set_motor_current_enabled(true);
        let worker = worker(&controller);

        let found = worker.find_end_switch(&CancelToken::new(false), Sign::Positive);
        assert_eq!(found, Ok(10_000));
        assert_eq!(worker.shared.error_mode(), ErrorMode::NoError);
    }

    #[test]
    fn test_search_reaching_target_without_switch_stalls() {
        let controller = Arc::new(
            DummyMotorController::new()
                .with_end_switches(-10_000, 60_000)
                .with_auto_step(5000),
        );
        controller.set_motor_current_enabled(true);
        let worker = worker(&controller);

        let found = worker.find_end_switch(&CancelToken::new(false), Sign::Positive);
        assert_eq!(found, Err(Interruption::MoveInterrupted));
        assert_eq!(controller.get_actual_position(), END_SWITCH_SEARCH_STEPS);
    }

    proptest! {
        #[test]
        fn prop_identical_samples_have_zero_deviation(
            value in any::<i32>(),
            count in 1usize..=TOLERANCE_SAMPLES,
        ) {
            let samples = vec![value; count];
            let (mean, std_dev) = mean_and_std_dev(&samples);
            prop_assert_eq!(mean, f64::from(value));
            prop_assert_eq!(std_dev, 0.0);
        }
    }

    #[test]
    fn test_identical_samples_have_zero_deviation() {
        let (mean, std_dev) = mean_and_std_dev(&[1234; TOLERANCE_SAMPLES]);
        assert_eq!(mean, 1234.0);
        assert_eq!(std_dev, 0.0);
    }

    #[test]
    fn test_sample_standard_deviation() {
        // Classic example: population sd 2, sample sd sqrt(32/7).
        let (mean, std_dev) = mean_and_std_dev(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(mean_and_std_dev(&[]), (0.0, 0.0));
        assert_eq!(mean_and_std_dev(&[7]), (7.0, 0.0));
    }
}
