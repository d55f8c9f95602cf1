//! Domain primitives: TimeSecs, SubjectId.

use serde::{Deserialize, Serialize};

/// Seconds in one calendar day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Seconds in a 365-day year, the annualization base for yields.
pub const SECONDS_PER_YEAR: i64 = 365 * SECONDS_PER_DAY;

/// Time in whole seconds since Unix epoch (block timestamps).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeSecs(pub i64);

impl TimeSecs {
    /// Create a TimeSecs from seconds.
    pub fn new(secs: i64) -> Self {
        TimeSecs(secs)
    }

    /// Get the underlying seconds value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Seconds elapsed since the start of the UTC day containing this instant.
    pub fn seconds_into_day(&self) -> i64 {
        self.0.rem_euclid(SECONDS_PER_DAY)
    }

    /// Render as RFC 3339 for logs; falls back to the raw number when out of range.
    pub fn to_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp(self.0, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl std::fmt::Display for TimeSecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Sub for TimeSecs {
    type Output = i64;

    fn sub(self, rhs: TimeSecs) -> i64 {
        self.0 - rhs.0
    }
}

/// Logical subject a calculator state belongs to (an investor position, a vault, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub String);

impl SubjectId {
    /// Create a SubjectId from a string.
    pub fn new(id: String) -> Self {
        SubjectId(id)
    }

    /// Get the id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
