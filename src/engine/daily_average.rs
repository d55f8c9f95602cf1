use crate::domain::{Decimal, TimeSecs, SECONDS_PER_DAY};
use crate::error::{AnalyticsError, OrOverflow, Result};
use serde::{Deserialize, Serialize};

use super::FlatState;

/// Moving average of a metric sampled once per day.
///
/// Closed days weigh one full day each; the pending day weighs the seconds
/// elapsed since its UTC midnight.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayWeightedAverager {
    pending_value: Decimal,
    pending_value_timestamp: TimeSecs,
    closed_values: Vec<Decimal>,
}

impl DayWeightedAverager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the final reading of a fully elapsed day.
    pub fn add_value(&mut self, value: Decimal) {
        self.closed_values.push(value);
    }

    /// Overwrite the latest reading of the day still in progress.
    pub fn set_pending_value(&mut self, value: Decimal, timestamp: TimeSecs) {
        self.pending_value = value;
        self.pending_value_timestamp = timestamp;
    }

    /// Keep only the newest `entries_to_use` closed values.
    pub fn evict_old_entries(&mut self, entries_to_use: usize) -> Result<()> {
        if entries_to_use == 0 {
            return Err(AnalyticsError::InvalidRetention);
        }
        let excess = self.closed_values.len().saturating_sub(entries_to_use);
        if excess > 0 {
            self.closed_values.drain(..excess);
        }
        Ok(())
    }

    /// Evict to `entries_to_use` closed days, then average them with the pending day.
    pub fn avg(&mut self, entries_to_use: usize) -> Result<Decimal> {
        self.evict_old_entries(entries_to_use)?;

        if self.closed_values.is_empty() {
            return Ok(self.pending_value);
        }

        let one_day = Decimal::from(SECONDS_PER_DAY);
        let closed_seconds = one_day
            .checked_mul(Decimal::from(self.closed_values.len()))
            .or_overflow("daily average")?;
        let pending_seconds = Decimal::from(self.pending_value_timestamp.seconds_into_day());

        let mut weighted_sum = self
            .pending_value
            .checked_mul(pending_seconds)
            .or_overflow("daily average")?;
        for value in &self.closed_values {
            weighted_sum = value
                .checked_mul(one_day)
                .and_then(|weighted| weighted_sum.checked_add(weighted))
                .or_overflow("daily average")?;
        }
        closed_seconds
            .checked_add(pending_seconds)
            .and_then(|total_seconds| weighted_sum.checked_div(total_seconds))
            .or_overflow("daily average")
    }

    pub fn closed_values(&self) -> &[Decimal] {
        &self.closed_values
    }

    pub fn pending_value(&self) -> Decimal {
        self.pending_value
    }

    pub fn pending_value_timestamp(&self) -> TimeSecs {
        self.pending_value_timestamp
    }
}

impl FlatState for DayWeightedAverager {
    const KIND: &'static str = "daily_avg";

    fn to_flat(&self) -> Vec<Decimal> {
        let mut out = Vec::with_capacity(2 + self.closed_values.len());
        out.push(self.pending_value);
        out.push(Decimal::from(self.pending_value_timestamp.as_i64()));
        out.extend_from_slice(&self.closed_values);
        out
    }

    fn from_flat(values: &[Decimal]) -> Result<Self> {
        match values {
            [] => Ok(Self::new()),
            [_] => Err(AnalyticsError::MalformedState {
                kind: Self::KIND,
                reason: "missing pending value timestamp".to_string(),
            }),
            [pending_value, timestamp, closed @ ..] => {
                let timestamp =
                    timestamp
                        .trunc_to_i64()
                        .ok_or_else(|| AnalyticsError::MalformedState {
                            kind: Self::KIND,
                            reason: format!("timestamp {} out of range", timestamp),
                        })?;
                Ok(Self {
                    pending_value: *pending_value,
                    pending_value_timestamp: TimeSecs::new(timestamp),
                    closed_values: closed.to_vec(),
                })
            }
        }
    }
}
