//! Mapping of source timestamps to trading dates

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Europe::Madrid;

/// Resolves the trading date an epoch timestamp belongs to.
pub trait TradingCalendar: Send + Sync {
    fn trading_date(&self, timestamp_ms: i64) -> Option<NaiveDate>;
}

/// Dates in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct UtcCalendar;

impl TradingCalendar for UtcCalendar {
    fn trading_date(&self, timestamp_ms: i64) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map(|dt| dt.date_naive())
    }
}

/// Dates in Europe/Madrid, following the tz database's CET/CEST rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct MadridCalendar;

impl TradingCalendar for MadridCalendar {
    fn trading_date(&self, timestamp_ms: i64) -> Option<NaiveDate> {
        let utc = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)?;
        Some(utc.with_timezone(&Madrid).date_naive())
    }
}
