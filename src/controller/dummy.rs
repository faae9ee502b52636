//! In-memory controller for tests and demos.

use std::sync::{Mutex, MutexGuard};

use super::{DecoderReadoutMode, MotorController, ReferenceSwitchData};

/// An in-memory [`MotorController`].
///
/// The motor lives on a physical axis; the reported actual position is the physical
/// position plus an offset that `set_actual_position` adjusts. End switches sit at fixed
/// physical positions and stop any motion that runs into them.
///
/// With auto stepping enabled every `is_motor_moving` call advances the motor by a fixed
/// number of steps. Without it the motor stays put until [`complete_move`] is called.
///
/// [`complete_move`]: DummyMotorController::complete_move
#[derive(Debug)]
pub struct DummyMotorController {
    state: Mutex<DummyState>,
}

#[derive(Debug, Clone)]
struct DummyState {
    physical: i32,
    offset: i32,
    target: i32,
    auto_step: u32,
    current_enabled: bool,
    end_switch_power: bool,
    positive_switch: Option<i32>,
    negative_switch: Option<i32>,
    forced_switches: Option<(bool, bool)>,
    pause_at: Option<i32>,
    paused: bool,
    full_stepping: bool,
    microsteps_per_full_step: i32,
    positive_calibration: i32,
    negative_calibration: i32,
    calibration_time: u32,
    speed_limit: f64,
    max_speed: f64,
    current_limit: f64,
    max_current: f64,
    target_writes: usize,
}

impl Default for DummyMotorController {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyMotorController {
    /// Create a controller at position 0 without end switches, current off.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DummyState {
                physical: 0,
                offset: 0,
                target: 0,
                auto_step: 0,
                current_enabled: false,
                end_switch_power: false,
                positive_switch: None,
                negative_switch: None,
                forced_switches: None,
                pause_at: None,
                paused: false,
                full_stepping: false,
                microsteps_per_full_step: 1,
                positive_calibration: i32::MAX,
                negative_calibration: i32::MIN,
                calibration_time: 0,
                speed_limit: 1000.0,
                max_speed: 1000.0,
                current_limit: 1.0,
                max_current: 1.0,
                target_writes: 0,
            }),
        }
    }

    /// Advance the motor by `steps` on every `is_motor_moving` call.
    pub fn with_auto_step(self, steps: u32) -> Self {
        self.lock().auto_step = steps;
        self
    }

    /// Place enabled end switches at the given physical positions.
    pub fn with_end_switches(self, negative: i32, positive: i32) -> Self {
        {
            let mut s = self.lock();
            s.negative_switch = Some(negative);
            s.positive_switch = Some(positive);
        }
        self
    }

    /// Remove the positive end switch.
    pub fn without_positive_end_switch(self) -> Self {
        self.lock().positive_switch = None;
        self
    }

    /// Remove the negative end switch.
    pub fn without_negative_end_switch(self) -> Self {
        self.lock().negative_switch = None;
        self
    }

    /// Report one standstill when an auto-stepped move reaches `physical`.
    ///
    /// The target is kept, so the motor goes on once the target is written again.
    pub fn with_pause_at(self, physical: i32) -> Self {
        self.lock().pause_at = Some(physical);
        self
    }

    /// Set the number of microsteps per full step used when rounding in full-step mode.
    pub fn with_microsteps_per_full_step(self, microsteps: i32) -> Self {
        self.lock().microsteps_per_full_step = microsteps.max(1);
        self
    }

    /// Pre-load persisted calibration values.
    pub fn with_calibration(self, time: u32, negative: i32, positive: i32) -> Self {
        {
            let mut s = self.lock();
            s.calibration_time = time;
            s.negative_calibration = negative;
            s.positive_calibration = positive;
        }
        self
    }

    /// Set the speed and current capabilities.
    pub fn with_capabilities(self, max_speed: f64, max_current: f64) -> Self {
        {
            let mut s = self.lock();
            s.max_speed = max_speed;
            s.speed_limit = max_speed;
            s.max_current = max_current;
            s.current_limit = max_current;
        }
        self
    }

    /// Jump straight to the target, as if a move finished.
    pub fn complete_move(&self) {
        let mut s = self.lock();
        s.physical = s.target.wrapping_sub(s.offset);
    }

    /// Move the motor to a physical position without touching the target.
    pub fn set_physical_position(&self, physical: i32) {
        self.lock().physical = physical;
    }

    /// Physical position of the motor.
    pub fn physical_position(&self) -> i32 {
        self.lock().physical
    }

    /// Override the switch-active bits. Forcing a bit also halts the motor.
    pub fn force_reference_switches(&self, positive: bool, negative: bool) {
        let mut s = self.lock();
        s.forced_switches = Some((positive, negative));
        s.target = s.physical.wrapping_add(s.offset);
    }

    /// Stop overriding the switch-active bits.
    pub fn release_reference_switches(&self) {
        self.lock().forced_switches = None;
    }

    /// Number of `set_target_position` calls so far.
    pub fn target_writes(&self) -> usize {
        self.lock().target_writes
    }

    fn lock(&self) -> MutexGuard<'_, DummyState> {
        // A panicking test thread must not poison the controller for the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DummyState {
    fn actual(&self) -> i32 {
        self.physical.wrapping_add(self.offset)
    }

    fn switches(&self) -> (bool, bool) {
        if let Some(forced) = self.forced_switches {
            return forced;
        }
        let positive = self.positive_switch.map_or(false, |p| self.physical >= p);
        let negative = self.negative_switch.map_or(false, |n| self.physical <= n);
        (positive, negative)
    }

    fn direction(&self) -> i32 {
        (self.target.wrapping_sub(self.actual())).signum()
    }

    fn blocked(&self) -> bool {
        let (positive, negative) = self.switches();
        match self.direction() {
            1 => positive,
            -1 => negative,
            _ => true,
        }
    }

    fn moving(&self) -> bool {
        !self.paused
            && self.current_enabled && self.actual() != self.target && !self.blocked()
    }

    fn advance(&mut self) {
        if self.auto_step == 0 || !self.moving() {
            return;
        }
        let distance = i64::from(self.target) - i64::from(self.actual());
        let step = distance.clamp(-i64::from(self.auto_step), i64::from(self.auto_step));
        let mut next = (i64::from(self.physical) + step) as i32;
        if step > 0 {
            if let Some(p) = self.positive_switch {
                next = next.min(p.max(self.physical));
            }
        } else if let Some(n) = self.negative_switch {
            next = next.max(n.min(self.physical));
        }
        if let Some(pause) = self.pause_at {
            let (low, high) = (self.physical.min(next), self.physical.max(next));
            if pause > low && pause <= high {
                next = pause;
                self.pause_at = None;
                self.paused = true;
            }
        }
        self.physical = next;
    }
}

impl MotorController for DummyMotorController {
    fn get_actual_position(&self) -> i32 {
        self.lock().actual()
    }

    fn set_actual_position(&self, steps: i32) {
        let mut s = self.lock();
        s.offset = steps.wrapping_sub(s.physical);
    }

    fn get_target_position(&self) -> i32 {
        self.lock().target
    }

    fn set_target_position(&self, steps: i32) {
        let mut s = self.lock();
        s.target = steps;
        s.paused = false;
        s.target_writes += 1;
    }

    fn is_motor_moving(&self) -> bool {
        let mut s = self.lock();
        s.advance();
        s.moving()
    }

    fn is_enabled(&self) -> bool {
        self.lock().current_enabled
    }

    fn set_motor_current_enabled(&self, enable: bool) {
        self.lock().current_enabled = enable;
    }

    fn is_motor_current_enabled(&self) -> bool {
        self.lock().current_enabled
    }

    fn set_end_switch_power_enabled(&self, enable: bool) {
        self.lock().end_switch_power = enable;
    }

    fn is_end_switch_power_enabled(&self) -> bool {
        self.lock().end_switch_power
    }

    fn get_reference_switch_data(&self) -> ReferenceSwitchData {
        let s = self.lock();
        let (positive_active, negative_active) = s.switches();
        ReferenceSwitchData {
            positive_active,
            negative_active,
            positive_enabled: s.positive_switch.is_some(),
            negative_enabled: s.negative_switch.is_some(),
        }
    }

    fn set_positive_reference_switch_calibration(&self, steps: i32) {
        self.lock().positive_calibration = steps;
    }

    fn get_positive_reference_switch_calibration(&self) -> i32 {
        self.lock().positive_calibration
    }

    fn set_negative_reference_switch_calibration(&self, steps: i32) {
        self.lock().negative_calibration = steps;
    }

    fn get_negative_reference_switch_calibration(&self) -> i32 {
        self.lock().negative_calibration
    }

    fn set_calibration_time(&self, time: u32) {
        self.lock().calibration_time = time;
    }

    fn get_calibration_time(&self) -> u32 {
        self.lock().calibration_time
    }

    fn get_decoder_position(&self) -> i32 {
        self.lock().physical
    }

    fn get_decoder_readout_mode(&self) -> DecoderReadoutMode {
        DecoderReadoutMode::Incremental
    }

    fn enable_full_stepping(&self, enable: bool) {
        let mut s = self.lock();
        s.full_stepping = enable;
        if enable {
            let full = s.microsteps_per_full_step;
            let rounded = libm::round(f64::from(s.physical) / f64::from(full)) * f64::from(full);
            s.physical = rounded as i32;
        }
    }

    fn is_full_stepping(&self) -> bool {
        self.lock().full_stepping
    }

    fn set_user_speed_limit(&self, limit: f64) -> f64 {
        let mut s = self.lock();
        s.speed_limit = limit.clamp(0.0, s.max_speed);
        s.speed_limit
    }

    fn get_user_speed_limit(&self) -> f64 {
        self.lock().speed_limit
    }

    fn get_max_speed_capability(&self) -> f64 {
        self.lock().max_speed
    }

    fn set_user_current_limit(&self, limit: f64) -> f64 {
        let mut s = self.lock();
        s.current_limit = limit.clamp(0.0, s.max_current);
        s.current_limit
    }

    fn get_user_current_limit(&self) -> f64 {
        self.lock().current_limit
    }

    fn get_max_current_limit(&self) -> f64 {
        self.lock().max_current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_move_completes_on_request() {
        let c = DummyMotorController::new();
        c.set_motor_current_enabled(true);
        c.set_target_position(100);
        assert!(c.is_motor_moving());
        assert!(c.is_motor_moving());

        c.complete_move();
        assert!(!c.is_motor_moving());
        assert_eq!(c.get_actual_position(), 100);
    }

    #[test]
    fn test_no_motion_without_current() {
        let c = DummyMotorController::new().with_auto_step(10);
        c.set_target_position(100);
        assert!(!c.is_motor_moving());
        assert_eq!(c.get_actual_position(), 0);
    }

    #[test]
    fn test_auto_step_stops_at_end_switch() {
        let c = DummyMotorController::new()
            .with_auto_step(300)
            .with_end_switches(-1000, 1000);
        c.set_motor_current_enabled(true);
        c.set_target_position(50_000);
        while c.is_motor_moving() {}

        assert_eq!(c.get_actual_position(), 1000);
        assert!(c.get_reference_switch_data().positive_active);

        // Moving away from an active switch is allowed.
        c.set_target_position(0);
        assert!(c.is_motor_moving());
        while c.is_motor_moving() {}
        assert_eq!(c.get_actual_position(), 0);
        assert!(!c.get_reference_switch_data().positive_active);
    }

    #[test]
    fn test_pause_reports_one_standstill() {
        let c = DummyMotorController::new()
            .with_auto_step(500)
            .with_pause_at(1200);
        c.set_motor_current_enabled(true);
        c.set_target_position(3000);
        while c.is_motor_moving() {}
        assert_eq!(c.get_actual_position(), 1200);

        c.set_target_position(3000);
        while c.is_motor_moving() {}
        assert_eq!(c.get_actual_position(), 3000);
    }

    #[test]
    fn test_actual_position_is_offset_from_physical() {
        let c = DummyMotorController::new().with_end_switches(-10, 10);
        c.set_actual_position(500);
        assert_eq!(c.get_actual_position(), 500);
        assert_eq!(c.physical_position(), 0);
        assert_eq!(c.get_decoder_position(), 0);
    }

    #[test]
    fn test_full_stepping_rounds_position() {
        let c = DummyMotorController::new().with_microsteps_per_full_step(16);
        c.set_physical_position(37);
        c.enable_full_stepping(true);
        assert_eq!(c.get_actual_position(), 32);
    }

    #[test]
    fn test_limits_are_clamped_to_capabilities() {
        let c = DummyMotorController::new().with_capabilities(500.0, 2.0);
        assert_eq!(c.set_user_speed_limit(800.0), 500.0);
        assert_eq!(c.set_user_current_limit(1.5), 1.5);
        assert_eq!(c.get_user_current_limit(), 1.5);
    }
}
