//! Observation rows fed to the calculators, and their CSV parser.

use crate::domain::{Decimal, SubjectId, TimeSecs};
use std::io::Read;

use super::ReplayError;

/// What happened to a subject at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservationKind {
    /// Position change: positive buys, negative sells.
    Trade { share_delta: Decimal, price: Decimal },
    /// Fees or rewards collected while `tvl` was deployed.
    Collect { amount: Decimal, tvl: Decimal },
    /// Final metric reading of a finished day.
    DailyClose { value: Decimal },
    /// Latest metric reading of the current day.
    DailyPending { value: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub subject: SubjectId,
    pub timestamp: TimeSecs,
    pub kind: ObservationKind,
}

/// Parse observations from CSV with header `subject,kind,timestamp,value,price,tvl`.
///
/// `price` is required for `trade` rows and `tvl` for `collect` rows; other rows
/// may leave them empty.
pub fn parse_csv<R: Read>(input: R) -> Result<Vec<Observation>, ReplayError> {
    #[derive(Debug, serde::Deserialize)]
    struct Row {
        subject: String,
        kind: String,
        timestamp: i64,
        value: String,
        price: Option<String>,
        tvl: Option<String>,
    }

    fn decimal(line: usize, field: &str, raw: Option<&str>) -> Result<Decimal, ReplayError> {
        let raw = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ReplayError::Parse {
                line,
                reason: format!("missing {}", field),
            })?;
        Decimal::from_str_canonical(raw).map_err(|e| ReplayError::Parse {
            line,
            reason: format!("invalid {}: {}", field, e),
        })
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut observations = Vec::new();
    for (idx, record) in reader.deserialize::<Row>().enumerate() {
        // header is line 1
        let line = idx + 2;
        let row = record?;
        let value = decimal(line, "value", Some(row.value.as_str()))?;

        let kind = match row.kind.to_ascii_lowercase().as_str() {
            "trade" => ObservationKind::Trade {
                share_delta: value,
                price: decimal(line, "price", row.price.as_deref())?,
            },
            "collect" => ObservationKind::Collect {
                amount: value,
                tvl: decimal(line, "tvl", row.tvl.as_deref())?,
            },
            "daily_close" => ObservationKind::DailyClose { value },
            "daily_pending" => ObservationKind::DailyPending { value },
            other => {
                return Err(ReplayError::Parse {
                    line,
                    reason: format!("unknown kind: {}", other),
                })
            }
        };

        observations.push(Observation {
            subject: SubjectId::new(row.subject),
            timestamp: TimeSecs::new(row.timestamp),
            kind,
        });
    }

    Ok(observations)
}
