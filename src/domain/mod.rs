//! Domain types shared by the calculators.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeSecs, SubjectId
//! - Calendar constants used for day weighting and annualization

pub mod decimal;
pub mod primitives;

pub use decimal::Decimal;
pub use primitives::{SubjectId, TimeSecs, SECONDS_PER_DAY, SECONDS_PER_YEAR};
