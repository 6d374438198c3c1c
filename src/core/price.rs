//! Price records, sources and observations

use super::error::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Ft,
    Fundsquare,
    #[serde(other)]
    Unknown,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Ft => "ft",
            Source::Fundsquare => "fundsquare",
            Source::Unknown => "unknown",
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Source {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ft" => Ok(Source::Ft),
            "fundsquare" => Ok(Source::Fundsquare),
            "unknown" => Ok(Source::Unknown),
            _ => Err(ValidationError::InvalidSource {
                value: s.to_string(),
            }),
        }
    }
}

/// Authority rank of each source, higher wins. `unknown` is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePriority {
    pub ft: u32,
    pub fundsquare: u32,
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self {
            ft: 20,
            fundsquare: 10,
        }
    }
}

impl SourcePriority {
    pub fn new(ft: u32, fundsquare: u32) -> Result<Self, ValidationError> {
        let priority = Self { ft, fundsquare };
        priority.validate()?;
        Ok(priority)
    }

    /// Ranks must form a total order: known sources above `unknown` and never tied.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ft == 0 || self.fundsquare == 0 || self.ft == self.fundsquare {
            return Err(ValidationError::InvalidPriority {
                ft: self.ft,
                fundsquare: self.fundsquare,
            });
        }
        Ok(())
    }

    pub fn rank(&self, source: Source) -> u32 {
        match source {
            Source::Ft => self.ft,
            Source::Fundsquare => self.fundsquare,
            Source::Unknown => 0,
        }
    }
}

/// A candidate price reading for one instrument and date.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub close: f64,
    pub source: Source,
    pub source_timestamp_ms: Option<i64>,
}

impl Observation {
    pub fn new(close: f64, source: Source) -> Self {
        Self {
            close,
            source,
            source_timestamp_ms: None,
        }
    }

    pub fn with_source_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.source_timestamp_ms = Some(timestamp_ms);
        self
    }
}

/// An observation already resolved to its trading date by the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedObservation {
    pub date: NaiveDate,
    pub observation: Observation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub close: f64,
    pub source: Source,
    #[serde(default)]
    pub source_timestamp_ms: Option<i64>,
    pub saved_at_ms: i64,
    pub updated_at_ms: i64,
    #[serde(default)]
    pub previous_source: Option<Source>,
    #[serde(default)]
    pub previous_close: Option<f64>,
}

impl PriceRecord {
    /// Builds the record that replaces `existing` (if any) with `candidate` at `now_ms`.
    /// `saved_at_ms` is carried over from the replaced record.
    pub fn replacing(
        existing: Option<&PriceRecord>,
        date: NaiveDate,
        candidate: &Observation,
        now_ms: i64,
    ) -> Self {
        Self {
            date,
            close: candidate.close,
            source: candidate.source,
            source_timestamp_ms: candidate.source_timestamp_ms,
            saved_at_ms: existing.map_or(now_ms, |prev| prev.saved_at_ms),
            updated_at_ms: now_ms,
            previous_source: existing.map(|prev| prev.source),
            previous_close: existing.map(|prev| prev.close),
        }
    }

    pub fn point(&self) -> PricePoint {
        PricePoint {
            date: self.date,
            close: self.close,
        }
    }
}

/// The downstream view of a series entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !well_formed {
        return Err(ValidationError::InvalidDate {
            value: value.to_string(),
        });
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| ValidationError::InvalidDate {
        value: value.to_string(),
    })
}

/// Checks an instrument code. `/` is reserved as the storage key separator.
pub fn validate_instrument(code: &str) -> Result<&str, ValidationError> {
    if code.is_empty() {
        return Err(ValidationError::EmptyInstrument);
    }
    if let Some(ch) = code
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || *c == '/')
    {
        return Err(ValidationError::InvalidInstrumentChar {
            code: code.to_string(),
            ch,
        });
    }
    Ok(code)
}
