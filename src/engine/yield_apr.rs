//! Time-weighted annualized yield over a trailing window.
//!
//! Every collection event is attributed to the gap since the previous
//! observation; only the part of that gap inside the window counts. The
//! weighted rate is then scaled up to a 365-day year.

use crate::domain::{Decimal, TimeSecs, SECONDS_PER_YEAR};
use crate::error::{AnalyticsError, OrOverflow, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::{records, FlatState};

/// One collection event: an amount earned at `timestamp` while `total_value_locked` was deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldObservation {
    pub collected_amount: Decimal,
    pub timestamp: TimeSecs,
    pub total_value_locked: Decimal,
}

/// Persisted observations, strictly increasing by timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldState {
    observations: Vec<YieldObservation>,
}

impl YieldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> &[YieldObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    fn push(&mut self, observation: YieldObservation) -> Result<()> {
        if let Some(last) = self.observations.last() {
            if observation.timestamp <= last.timestamp {
                return Err(AnalyticsError::OutOfOrder {
                    last: last.timestamp,
                    got: observation.timestamp,
                });
            }
        }
        self.observations.push(observation);
        Ok(())
    }
}

impl FlatState for YieldState {
    const KIND: &'static str = "apr";

    fn to_flat(&self) -> Vec<Decimal> {
        self.observations
            .iter()
            .flat_map(|o| {
                [
                    o.collected_amount,
                    Decimal::from(o.timestamp.as_i64()),
                    o.total_value_locked,
                ]
            })
            .collect()
    }

    fn from_flat(values: &[Decimal]) -> Result<Self> {
        let mut state = Self::new();
        for chunk in records(Self::KIND, values, 3)? {
            let timestamp = chunk[1]
                .trunc_to_i64()
                .ok_or_else(|| AnalyticsError::MalformedState {
                    kind: Self::KIND,
                    reason: format!("timestamp {} out of range", chunk[1]),
                })?;
            state
                .push(YieldObservation {
                    collected_amount: chunk[0],
                    timestamp: TimeSecs::new(timestamp),
                    total_value_locked: chunk[2],
                })
                .map_err(|e| AnalyticsError::MalformedState {
                    kind: Self::KIND,
                    reason: e.to_string(),
                })?;
        }
        Ok(state)
    }
}

/// APR calculator bound to a fixed look-back window.
///
/// The window is chosen per usage site and is not part of the persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowedYieldEstimator {
    window: Duration,
    state: YieldState,
}

impl WindowedYieldEstimator {
    /// # Errors
    /// Returns [`AnalyticsError::InvalidWindow`] if `window` is not positive.
    pub fn new(window: Duration) -> Result<Self> {
        Self::with_state(window, YieldState::new())
    }

    pub fn with_state(window: Duration, state: YieldState) -> Result<Self> {
        if window <= Duration::zero() {
            return Err(AnalyticsError::InvalidWindow {
                secs: window.num_seconds(),
            });
        }
        Ok(Self { window, state })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state(&self) -> &YieldState {
        &self.state
    }

    pub fn into_state(self) -> YieldState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Record a collection event. Zero amounts are ignored.
    ///
    /// # Errors
    /// Returns [`AnalyticsError::OutOfOrder`] if `timestamp` is not after the last
    /// stored observation.
    pub fn add_transaction(
        &mut self,
        collected_amount: Decimal,
        timestamp: TimeSecs,
        total_value_locked: Decimal,
    ) -> Result<()> {
        if collected_amount.is_zero() {
            return Ok(());
        }
        self.state.push(YieldObservation {
            collected_amount,
            timestamp,
            total_value_locked,
        })
    }

    /// Drop observations older than the window, keeping one anchor before it.
    pub fn evict_old_entries(&mut self, now: TimeSecs) {
        let period_start = self.period_start(now);
        let observations = &mut self.state.observations;
        if observations.len() < 2 {
            return;
        }

        let first_inside = observations
            .iter()
            .position(|o| o.timestamp.as_i64() > period_start)
            .unwrap_or(observations.len());
        let anchor = first_inside.saturating_sub(1);
        if anchor > 0 {
            tracing::debug!(evicted = anchor, now = %now.to_rfc3339(), "Evicted yield observations");
            observations.drain(..anchor);
        }
    }

    /// Annualized yield over the trailing window ending at `now`.
    ///
    /// With a single observation the raw `collected / tvl` ratio is returned
    /// without annualization.
    ///
    /// # Errors
    /// Returns [`AnalyticsError::ZeroElapsedPeriod`] if `now` is not after the
    /// oldest retained observation while two or more are held, and
    /// [`AnalyticsError::Overflow`] if the weighted rate leaves the decimal range.
    pub fn calculate_last_apr(&mut self, now: TimeSecs) -> Result<Decimal> {
        self.evict_old_entries(now);

        let observations = self.state.observations();
        let (first, rest) = match observations.split_first() {
            None => return Ok(Decimal::zero()),
            Some(split) => split,
        };
        if rest.is_empty() {
            return Ok(first
                .collected_amount
                .checked_div(first.total_value_locked)
                .unwrap_or_default());
        }

        let window_secs = self.window.num_seconds();
        let elapsed_period = now
            .as_i64()
            .saturating_sub(first.timestamp.as_i64())
            .min(window_secs);
        if elapsed_period <= 0 {
            return Err(AnalyticsError::ZeroElapsedPeriod);
        }

        let period_start = self.period_start(now);
        let mut weighted_yield_rate = Decimal::zero();
        for pair in observations.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if curr.total_value_locked.is_zero() {
                tracing::warn!(timestamp = %curr.timestamp, "Skipping yield slice with zero TVL");
                continue;
            }
            let slice_start = period_start.max(prev.timestamp.as_i64());
            // decimal differences cannot overflow for any pair of i64 timestamps
            let slice_end = Decimal::from(curr.timestamp.as_i64());
            let slice_duration = slice_end - Decimal::from(slice_start);
            let gap = slice_end - Decimal::from(prev.timestamp.as_i64());
            let slice_rate = curr
                .collected_amount
                .checked_mul(slice_duration)
                .and_then(|scaled| scaled.checked_div(gap))
                .and_then(|slice_collected| slice_collected.checked_div(curr.total_value_locked))
                .and_then(|rate| rate.checked_mul(slice_duration))
                .or_overflow("weighted yield rate")?;
            weighted_yield_rate = weighted_yield_rate
                .checked_add(slice_rate)
                .or_overflow("weighted yield rate")?;
        }

        let elapsed_period = Decimal::from(elapsed_period);
        let periods_per_year = Decimal::from(SECONDS_PER_YEAR) / elapsed_period;
        weighted_yield_rate
            .checked_div(elapsed_period)
            .and_then(|yield_rate| yield_rate.checked_mul(periods_per_year))
            .or_overflow("annualized yield")
    }

    fn period_start(&self, now: TimeSecs) -> i64 {
        now.as_i64().saturating_sub(self.window.num_seconds())
    }
}
