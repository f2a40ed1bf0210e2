use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc};

use super::PeriodKey;

/// Maps a point in time to the bucket it is aggregated into.
///
/// Implementations must be pure and total: two timestamps share a key iff they
/// fall into the same bucket.
pub trait PeriodKeyer: Send + Sync {
    fn period_key(&self, at: DateTime<Utc>) -> PeriodKey;

    fn name(&self) -> &'static str;
}

/// Calendar-day buckets (`YYYY-MM-DD`) evaluated in a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyPeriodKeyer {
    offset: FixedOffset,
}

impl DailyPeriodKeyer {
    pub fn utc() -> Self {
        Self::with_offset(utc_offset())
    }

    pub fn with_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Default for DailyPeriodKeyer {
    fn default() -> Self {
        Self::utc()
    }
}

impl PeriodKeyer for DailyPeriodKeyer {
    fn period_key(&self, at: DateTime<Utc>) -> PeriodKey {
        PeriodKey::new(at.with_timezone(&self.offset).format("%Y-%m-%d").to_string())
    }

    fn name(&self) -> &'static str {
        "daily"
    }
}

/// ISO-week buckets (`YYYY-Www`) evaluated in a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyPeriodKeyer {
    offset: FixedOffset,
}

impl WeeklyPeriodKeyer {
    pub fn utc() -> Self {
        Self::with_offset(utc_offset())
    }

    pub fn with_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl PeriodKeyer for WeeklyPeriodKeyer {
    fn period_key(&self, at: DateTime<Utc>) -> PeriodKey {
        let week = at.with_timezone(&self.offset).iso_week();
        PeriodKey::new(format!("{:04}-W{:02}", week.year(), week.week()))
    }

    fn name(&self) -> &'static str {
        "weekly"
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}
