use crate::domain::{Decimal, TimeSecs};
use thiserror::Error;

/// Errors raised by the calculators and their state codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    #[error("Configuration error: window length must be positive, got {secs}s")]
    InvalidWindow { secs: i64 },
    #[error("Configuration error: retention count must be positive")]
    InvalidRetention,
    #[error("Ordering violation: observation at {got} is not after last stored {last}")]
    OutOfOrder { last: TimeSecs, got: TimeSecs },
    #[error("Oversell: requested {requested} shares but only {available} are held")]
    Oversell {
        requested: Decimal,
        available: Decimal,
    },
    #[error("Arithmetic overflow in {op}")]
    Overflow { op: &'static str },
    #[error("Elapsed period is zero; cannot annualize")]
    ZeroElapsedPeriod,
    #[error("Malformed {kind} state: {reason}")]
    MalformedState { kind: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Turn a failed checked operation into [`AnalyticsError::Overflow`].
pub(crate) trait OrOverflow<T> {
    fn or_overflow(self, op: &'static str) -> Result<T>;
}

impl<T> OrOverflow<T> for Option<T> {
    fn or_overflow(self, op: &'static str) -> Result<T> {
        self.ok_or(AnalyticsError::Overflow { op })
    }
}
