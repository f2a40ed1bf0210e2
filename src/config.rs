use chrono::{FixedOffset, Offset, Utc};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::stats::{DailyPeriodKeyer, PeriodKeyer, WeeklyPeriodKeyer};
use crate::tournament::ParticipantResolution;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodGranularity {
    #[default]
    Daily,
    Weekly,
}

impl FromStr for PeriodGranularity {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Self::Daily),
            "weekly" | "week" => Ok(Self::Weekly),
            other => Err(format!("unknown period '{}'", other)),
        }
    }
}

/// Runtime configuration, read from `TALLY_*` environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_addr: String,
    /// In-memory stores are used when absent
    pub database_url: Option<String>,
    /// JSON list of tournaments preloaded into the in-memory lookup
    pub tournaments_file: Option<PathBuf>,
    pub participant_resolution: ParticipantResolution,
    pub period: PeriodGranularity,
    pub period_offset: FixedOffset,
    pub merge_max_retries: u32,
    pub merge_backoff: Duration,
    pub dedupe_events: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: None,
            tournaments_file: None,
            participant_resolution: ParticipantResolution::Positional,
            period: PeriodGranularity::Daily,
            period_offset: Utc.fix(),
            merge_max_retries: 3,
            merge_backoff: Duration::from_millis(100),
            dedupe_events: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let offset_minutes: i32 = parse_or(&lookup, "TALLY_PERIOD_UTC_OFFSET_MINUTES", 0)?;
        let period_offset = FixedOffset::east_opt(offset_minutes.saturating_mul(60)).ok_or_else(|| {
            ConfigError::Invalid {
                key: "TALLY_PERIOD_UTC_OFFSET_MINUTES",
                value: offset_minutes.to_string(),
                reason: "offset must be within +/- 24h".to_string(),
            }
        })?;

        Ok(Self {
            bind_addr: lookup("TALLY_BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            tournaments_file: lookup("TALLY_TOURNAMENTS_FILE")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            participant_resolution: parse_or(
                &lookup,
                "TALLY_PARTICIPANT_KEYS",
                defaults.participant_resolution,
            )?,
            period: parse_or(&lookup, "TALLY_PERIOD", defaults.period)?,
            period_offset,
            merge_max_retries: parse_or(&lookup, "TALLY_MERGE_MAX_RETRIES", defaults.merge_max_retries)?,
            merge_backoff: Duration::from_millis(parse_or(&lookup, "TALLY_MERGE_BACKOFF_MS", 100u64)?),
            dedupe_events: parse_or(&lookup, "TALLY_DEDUPE_EVENTS", defaults.dedupe_events)?,
        })
    }

    pub fn period_keyer(&self) -> Arc<dyn PeriodKeyer> {
        match self.period {
            PeriodGranularity::Daily => Arc::new(DailyPeriodKeyer::with_offset(self.period_offset)),
            PeriodGranularity::Weekly => Arc::new(WeeklyPeriodKeyer::with_offset(self.period_offset)),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: ToString,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
