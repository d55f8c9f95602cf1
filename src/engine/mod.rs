//! Pure computation engines for position analytics.
//!
//! Each calculator is a value type: callers load it from a flat decimal vector,
//! feed it one observation, and persist the vector it serializes back to.

use crate::domain::Decimal;
use crate::error::{AnalyticsError, Result};

pub mod daily_average;
pub mod lot_pnl;
pub mod yield_apr;

pub use daily_average::DayWeightedAverager;
pub use lot_pnl::{Lot, LotPnlTracker};
pub use yield_apr::{WindowedYieldEstimator, YieldObservation, YieldState};

/// Persistence contract shared by every calculator state.
///
/// The owning entity stores the state as an opaque ordered sequence of decimals.
/// An empty sequence decodes to an empty state, and
/// `from_flat(&s.to_flat()) == s` holds exactly.
pub trait FlatState: Sized {
    /// Label used in error messages.
    const KIND: &'static str;

    fn to_flat(&self) -> Vec<Decimal>;

    fn from_flat(values: &[Decimal]) -> Result<Self>;
}

/// Split `values` into fixed-width records, rejecting a trailing partial record.
fn records<'a>(
    kind: &'static str,
    values: &'a [Decimal],
    width: usize,
) -> Result<std::slice::ChunksExact<'a, Decimal>> {
    if values.len() % width != 0 {
        return Err(AnalyticsError::MalformedState {
            kind,
            reason: format!(
                "expected a multiple of {} values, got {}",
                width,
                values.len()
            ),
        });
    }
    Ok(values.chunks_exact(width))
}
