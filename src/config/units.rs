//! Unit conversion between motor steps and user units.
//!
//! Every `..._in_steps` operation of a motor has a units counterpart that goes through
//! a [`UnitsConverter`]. The default is 1:1.

use core::fmt;

use crate::error::ConfigError;

/// Converts between user units and integer steps.
pub trait UnitsConverter: Send + Sync + fmt::Debug {
    /// Convert a value in user units to steps (rounded to the nearest step).
    fn units_to_steps(&self, units: f64) -> i32;

    /// Convert steps to user units.
    fn steps_to_units(&self, steps: i32) -> f64;
}

/// Linear converter: `units = steps * units_per_step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingConverter {
    units_per_step: f64,
}

impl ScalingConverter {
    /// One unit per step.
    pub const IDENTITY: Self = Self { units_per_step: 1.0 };

    /// Create a converter with validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUnitsPerStep` if the factor is zero or not finite.
    pub fn new(units_per_step: f64) -> Result<Self, ConfigError> {
        if units_per_step.is_finite() && units_per_step != 0.0 {
            Ok(Self { units_per_step })
        } else {
            Err(ConfigError::InvalidUnitsPerStep(units_per_step))
        }
    }

    /// Get the conversion factor.
    #[inline]
    pub const fn units_per_step(&self) -> f64 {
        self.units_per_step
    }
}

impl Default for ScalingConverter {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl UnitsConverter for ScalingConverter {
    fn units_to_steps(&self, units: f64) -> i32 {
        saturate(libm::round(units / self.units_per_step))
    }

    fn steps_to_units(&self, steps: i32) -> f64 {
        f64::from(steps) * self.units_per_step
    }
}

/// Clamp a rounded float to the `i32` step range.
fn saturate(value: f64) -> i32 {
    if value.is_nan() {
        0
    } else if value >= f64::from(i32::MAX) {
        i32::MAX
    } else if value <= f64::from(i32::MIN) {
        i32::MIN
    } else {
        value as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_one_to_one() {
        let c = ScalingConverter::default();
        assert_eq!(c.units_to_steps(42.0), 42);
        assert_eq!(c.steps_to_units(-7), -7.0);
    }

    #[test]
    fn test_scaling_rounds_to_nearest_step() {
        // 0.01 mm per step
        let c = ScalingConverter::new(0.01).unwrap();
        assert_eq!(c.units_to_steps(1.0), 100);
        assert_eq!(c.units_to_steps(1.004), 100);
        assert_eq!(c.units_to_steps(-1.006), -101);
        assert!((c.steps_to_units(250) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_conversion_saturates() {
        let c = ScalingConverter::new(1e-6).unwrap();
        assert_eq!(c.units_to_steps(1e9), i32::MAX);
        assert_eq!(c.units_to_steps(-1e9), i32::MIN);
    }

    #[test]
    fn test_invalid_factor_rejected() {
        assert!(ScalingConverter::new(0.0).is_err());
        assert!(ScalingConverter::new(f64::NAN).is_err());
        assert!(ScalingConverter::new(f64::INFINITY).is_err());
        assert!(ScalingConverter::new(-2.0).is_ok());
    }
}
