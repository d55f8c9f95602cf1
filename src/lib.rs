pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod replay;

pub use config::{Config, OversellPolicy};
pub use domain::{Decimal, SubjectId, TimeSecs};
pub use engine::{
    DayWeightedAverager, FlatState, Lot, LotPnlTracker, WindowedYieldEstimator, YieldObservation,
    YieldState,
};
pub use error::AnalyticsError;
pub use replay::{MemoryStateStore, Replayer, StateStore};
