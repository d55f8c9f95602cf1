//! Replays observation streams through the calculators.
//!
//! Plays the part of the host event pipeline: for every observation it loads the
//! subject's flat state, applies the observation, and saves the new flat state.

use crate::config::{Config, OversellPolicy};
use crate::domain::{Decimal, SubjectId, TimeSecs};
use crate::engine::{DayWeightedAverager, FlatState, LotPnlTracker, WindowedYieldEstimator, YieldState};
use crate::error::AnalyticsError;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod observation;
pub mod store;

pub use observation::{parse_csv, Observation, ObservationKind};
pub use store::{MemoryStateStore, StateKey, StateStore};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error(transparent)]
    Engine(#[from] AnalyticsError),
}

/// Per-subject bookkeeping that is not part of any calculator state.
#[derive(Debug, Clone, Default)]
struct SubjectCursor {
    last_timestamp: TimeSecs,
    last_price: Option<Decimal>,
    shortfall: Decimal,
}

/// Position metrics of a subject that traded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlSummary {
    pub realized_pnl: Decimal,
    /// Valued at the last traded price.
    pub unrealized_pnl: Decimal,
    pub remaining_shares: Decimal,
    pub avg_entry_price: Decimal,
    pub open_lots: usize,
    /// Shares sold beyond holdings under the truncating oversell policy.
    pub shortfall: Decimal,
}

/// Metrics for one subject after a replay.
///
/// A metric is `None` when the subject never fed that calculator or when
/// evaluating it failed; failures are listed in `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReport {
    pub subject: SubjectId,
    pub as_of: TimeSecs,
    pub pnl: Option<PnlSummary>,
    pub apr: Option<Decimal>,
    pub daily_average: Option<Decimal>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub processed: usize,
    pub skipped: usize,
    pub subjects: Vec<SubjectReport>,
}

pub struct Replayer<S: StateStore> {
    store: S,
    config: Config,
    cursors: BTreeMap<SubjectId, SubjectCursor>,
    processed: usize,
    skipped: usize,
}

impl<S: StateStore> Replayer<S> {
    pub fn new(store: S, config: Config) -> Self {
        Self {
            store,
            config,
            cursors: BTreeMap::new(),
            processed: 0,
            skipped: 0,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply every observation in order. Rejected observations are logged and skipped.
    pub fn run(&mut self, observations: &[Observation]) {
        for observation in observations {
            match self.apply(observation) {
                Ok(()) => self.processed += 1,
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!(
                        subject = %observation.subject,
                        timestamp = %observation.timestamp,
                        error = %e,
                        "Skipping observation"
                    );
                }
            }
        }
    }

    /// Apply one observation to its subject's state.
    ///
    /// On error nothing is persisted, so the stored state stays as it was.
    pub fn apply(&mut self, observation: &Observation) -> Result<(), ReplayError> {
        let subject = &observation.subject;
        let mut shortfall = Decimal::zero();
        let mut traded_at = None;

        match &observation.kind {
            ObservationKind::Trade { share_delta, price } => {
                let mut tracker: LotPnlTracker = self.load(subject)?;
                match self.config.oversell_policy {
                    OversellPolicy::Reject => tracker.add_transaction(*share_delta, *price)?,
                    OversellPolicy::Truncate => {
                        shortfall = tracker.add_transaction_truncating(*share_delta, *price)?;
                    }
                }
                self.save(subject, &tracker);
                traded_at = Some(*price);
            }
            ObservationKind::Collect { amount, tvl } => {
                let mut estimator = self.estimator(subject)?;
                estimator.add_transaction(*amount, observation.timestamp, *tvl)?;
                self.save(subject, estimator.state());
            }
            ObservationKind::DailyClose { value } => {
                let mut averager: DayWeightedAverager = self.load(subject)?;
                averager.add_value(*value);
                self.save(subject, &averager);
            }
            ObservationKind::DailyPending { value } => {
                let mut averager: DayWeightedAverager = self.load(subject)?;
                averager.set_pending_value(*value, observation.timestamp);
                self.save(subject, &averager);
            }
        }

        let cursor = self.cursors.entry(subject.clone()).or_default();
        cursor.last_timestamp = cursor.last_timestamp.max(observation.timestamp);
        cursor.shortfall += shortfall;
        if traded_at.is_some() {
            cursor.last_price = traded_at;
        }
        Ok(())
    }

    /// Evaluate every subject seen so far, sorted by subject.
    ///
    /// APR and daily-average evaluation evict old entries; the evicted states are
    /// persisted like any other update. A failing metric only affects its own
    /// subject: it is logged, reported as `None` and listed in `errors`.
    pub fn report(&mut self) -> ReplayReport {
        let subjects: Vec<(SubjectId, SubjectCursor)> = self
            .cursors
            .iter()
            .map(|(subject, cursor)| (subject.clone(), cursor.clone()))
            .collect();

        let mut reports = Vec::with_capacity(subjects.len());
        for (subject, cursor) in subjects {
            let as_of = self.config.as_of.unwrap_or(cursor.last_timestamp);
            let mut errors = Vec::new();

            let pnl = self
                .has_state::<LotPnlTracker>(&subject)
                .then(|| self.pnl_summary(&subject, &cursor));
            let apr = self
                .has_state::<YieldState>(&subject)
                .then(|| self.evaluate_apr(&subject, as_of));
            let daily_average = self
                .has_state::<DayWeightedAverager>(&subject)
                .then(|| self.evaluate_daily_average(&subject));

            reports.push(SubjectReport {
                pnl: absorb(&subject, "pnl", pnl, &mut errors),
                apr: absorb(&subject, "apr", apr, &mut errors),
                daily_average: absorb(&subject, "daily average", daily_average, &mut errors),
                errors,
                subject,
                as_of,
            });
        }

        tracing::info!(
            processed = self.processed,
            skipped = self.skipped,
            subjects = reports.len(),
            "Replay complete"
        );

        ReplayReport {
            processed: self.processed,
            skipped: self.skipped,
            subjects: reports,
        }
    }

    fn pnl_summary(
        &self,
        subject: &SubjectId,
        cursor: &SubjectCursor,
    ) -> Result<PnlSummary, AnalyticsError> {
        let tracker: LotPnlTracker = self.load(subject)?;
        let unrealized_pnl = match cursor.last_price {
            Some(price) => tracker.unrealized_pnl(price)?,
            None => Decimal::zero(),
        };
        Ok(PnlSummary {
            realized_pnl: tracker.realized_pnl(),
            unrealized_pnl,
            remaining_shares: tracker.remaining_shares()?,
            avg_entry_price: tracker.remaining_shares_avg_entry_price()?,
            open_lots: tracker.open_lot_count(),
            shortfall: cursor.shortfall,
        })
    }

    fn evaluate_apr(&mut self, subject: &SubjectId, as_of: TimeSecs) -> Result<Decimal, AnalyticsError> {
        let mut estimator = self.estimator(subject)?;
        let apr = estimator.calculate_last_apr(as_of)?;
        self.save(subject, estimator.state());
        Ok(apr)
    }

    fn evaluate_daily_average(&mut self, subject: &SubjectId) -> Result<Decimal, AnalyticsError> {
        let mut averager: DayWeightedAverager = self.load(subject)?;
        let avg = averager.avg(self.config.daily_avg_entries)?;
        self.save(subject, &averager);
        Ok(avg)
    }

    fn estimator(&self, subject: &SubjectId) -> Result<WindowedYieldEstimator, AnalyticsError> {
        let state: YieldState = self.load(subject)?;
        WindowedYieldEstimator::with_state(self.config.apr_window, state)
    }

    fn has_state<T: FlatState>(&self, subject: &SubjectId) -> bool {
        self.store
            .load(&StateKey::new(subject.clone(), T::KIND))
            .is_some()
    }

    fn load<T: FlatState>(&self, subject: &SubjectId) -> Result<T, AnalyticsError> {
        let values = self
            .store
            .load(&StateKey::new(subject.clone(), T::KIND))
            .unwrap_or_default();
        T::from_flat(&values)
    }

    fn save<T: FlatState>(&mut self, subject: &SubjectId, state: &T) {
        self.store
            .save(StateKey::new(subject.clone(), T::KIND), state.to_flat());
    }
}

/// Unwrap a per-subject metric, logging and recording a failure instead of propagating it.
fn absorb<T>(
    subject: &SubjectId,
    metric: &'static str,
    outcome: Option<Result<T, AnalyticsError>>,
    errors: &mut Vec<String>,
) -> Option<T> {
    match outcome? {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(%subject, metric, error = %e, "Metric evaluation failed");
            errors.push(format!("{}: {}", metric, e));
            None
        }
    }
}
