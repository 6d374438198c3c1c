use std::path::PathBuf;
use thiserror::Error;

/// Caller contract violations. Nothing is read or written when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("instrument code cannot be empty")]
    EmptyInstrument,
    #[error("instrument code '{code}' contains invalid character {ch:?}")]
    InvalidInstrumentChar { code: String, ch: char },
    #[error("date must be a calendar date formatted YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("invalid source '{value}', expected one of ft, fundsquare, unknown")]
    InvalidSource { value: String },
    #[error("source priorities must be positive and distinct (ft={ft}, fundsquare={fundsquare})")]
    InvalidPriority { ft: u32, fundsquare: u32 },
    #[error("retention must keep at least one date")]
    ZeroRetention,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Backend(#[from] fjall::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store at {} is in use by another process", path.display())]
    Locked { path: PathBuf },
}

impl StoreError {
    /// True when the failure happened while reading or writing persisted state,
    /// as opposed to a rejected input. Only these are worth retrying.
    pub fn is_storage(&self) -> bool {
        !matches!(self, StoreError::Validation(_))
    }
}
