//! Software position limits.

use serde::Deserialize;

/// Software limits in steps.
///
/// `i32::MIN` / `i32::MAX` act as "unbounded" and are the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SoftwareLimits {
    /// Minimum allowed position in steps.
    #[serde(default = "unbounded_min")]
    pub min_steps: i32,

    /// Maximum allowed position in steps.
    #[serde(default = "unbounded_max")]
    pub max_steps: i32,

    /// Whether the limits are enforced.
    #[serde(default)]
    pub enabled: bool,
}

fn unbounded_min() -> i32 {
    i32::MIN
}

fn unbounded_max() -> i32 {
    i32::MAX
}

impl Default for SoftwareLimits {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl SoftwareLimits {
    /// Full signed range, not enforced.
    pub const UNBOUNDED: Self = Self {
        min_steps: i32::MIN,
        max_steps: i32::MAX,
        enabled: false,
    };

    /// Create new limits.
    pub fn new(min_steps: i32, max_steps: i32, enabled: bool) -> Self {
        Self {
            min_steps,
            max_steps,
            enabled,
        }
    }

    /// Check if limits are valid (min < max).
    pub fn is_valid(&self) -> bool {
        self.min_steps < self.max_steps
    }

    /// Check if a position is within `[min, max]`.
    pub fn contains(&self, steps: i32) -> bool {
        steps >= self.min_steps && steps <= self.max_steps
    }

    /// Check a position against the limits, honouring `enabled`.
    pub fn allows(&self, steps: i32) -> bool {
        !self.enabled || self.contains(steps)
    }

    /// Shift both limits by `delta`.
    ///
    /// A limit sitting at its unbounded sentinel stays unbounded. Returns `None` if a
    /// finite limit would leave the signed range.
    pub fn translated(&self, delta: i32) -> Option<Self> {
        let min_steps = if self.min_steps == i32::MIN {
            i32::MIN
        } else {
            self.min_steps.checked_add(delta)?
        };
        let max_steps = if self.max_steps == i32::MAX {
            i32::MAX
        } else {
            self.max_steps.checked_add(delta)?
        };
        Some(Self {
            min_steps,
            max_steps,
            enabled: self.enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_only_checks_when_enabled() {
        let mut limits = SoftwareLimits::new(-100, 100, false);
        assert!(limits.allows(1000));

        limits.enabled = true;
        assert!(limits.allows(100));
        assert!(limits.allows(-100));
        assert!(!limits.allows(101));
        assert!(!limits.allows(-101));
    }

    #[test]
    fn test_translate_finite_limits() {
        let limits = SoftwareLimits::new(-100, 100, true);
        let shifted = limits.translated(50).unwrap();
        assert_eq!(shifted.min_steps, -50);
        assert_eq!(shifted.max_steps, 150);
        assert!(shifted.enabled);
    }

    #[test]
    fn test_translate_keeps_unbounded_sentinels() {
        let shifted = SoftwareLimits::UNBOUNDED.translated(1_000).unwrap();
        assert_eq!(shifted, SoftwareLimits::UNBOUNDED);

        let shifted = SoftwareLimits::UNBOUNDED.translated(-1_000).unwrap();
        assert_eq!(shifted, SoftwareLimits::UNBOUNDED);
    }

    #[test]
    fn test_translate_overflow_rejected() {
        let limits = SoftwareLimits::new(0, i32::MAX - 10, true);
        assert!(limits.translated(100).is_none());

        let limits = SoftwareLimits::new(i32::MIN + 10, 0, true);
        assert!(limits.translated(-100).is_none());
    }
}
