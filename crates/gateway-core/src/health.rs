//! Module health states.

use serde::{Serialize, Serializer};

/// Health of the module, ordered from worst to best.
///
/// Ordering is meaningful: anything `< HealthState::Good` counts as a bad
/// health result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthState {
    Critical = 0,
    Warning = 1,
    Good = 2,
}

impl HealthState {
    pub fn is_good(self) -> bool {
        self == HealthState::Good
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Critical => write!(f, "Critical"),
            HealthState::Warning => write!(f, "Warning"),
            HealthState::Good => write!(f, "Good"),
        }
    }
}

// Heartbeat telemetry carries the numeric value.
impl Serialize for HealthState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}
