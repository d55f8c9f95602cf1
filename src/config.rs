use crate::domain::TimeSecs;
use chrono::Duration;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub replay_input: String,
    pub apr_window: Duration,
    pub daily_avg_entries: usize,
    pub oversell_policy: OversellPolicy,
    pub as_of: Option<TimeSecs>,
}

/// What to do when a sell exceeds the shares a tracker holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversellPolicy {
    /// Abort the update with an error.
    #[default]
    Reject,
    /// Consume what is held and report the shortfall.
    Truncate,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let replay_input = env_map
            .get("REPLAY_INPUT")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("REPLAY_INPUT".to_string()))?;

        let apr_window_secs = env_map
            .get("APR_WINDOW_SECS")
            .map(|s| s.as_str())
            .unwrap_or("86400")
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "APR_WINDOW_SECS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let daily_avg_entries = env_map
            .get("DAILY_AVG_ENTRIES")
            .map(|s| s.as_str())
            .unwrap_or("30")
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "DAILY_AVG_ENTRIES".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let oversell_policy = match env_map
            .get("OVERSELL_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("reject")
        {
            "reject" => OversellPolicy::Reject,
            "truncate" => OversellPolicy::Truncate,
            other => {
                return Err(ConfigError::InvalidValue(
                    "OVERSELL_POLICY".to_string(),
                    format!("must be reject or truncate, got {}", other),
                ))
            }
        };

        let as_of = env_map
            .get("AS_OF")
            .map(|s| {
                s.parse::<i64>().map(TimeSecs::new).map_err(|_| {
                    ConfigError::InvalidValue(
                        "AS_OF".to_string(),
                        "must be unix seconds".to_string(),
                    )
                })
            })
            .transpose()?;

        Ok(Config {
            replay_input,
            apr_window: Duration::seconds(apr_window_secs),
            daily_avg_entries,
            oversell_policy,
            as_of,
        })
    }
}
