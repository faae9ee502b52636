//! Events.

use core::fmt;

/// An immutable named token that triggers transitions.
///
/// Events only compare for equality; they carry no ordering or payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event(&'static str);

impl Event {
    /// Create a named event.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Get the event name.
    #[inline]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
