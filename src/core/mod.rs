//! Core business logic abstractions

pub mod book;
pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod health;
pub mod lock;
pub mod log;
pub mod price;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod update;

// Re-export main types for cleaner imports
pub use book::{PriceBook, UpsertOutcome};
pub use clock::{Clock, SystemClock};
pub use error::{StoreError, ValidationError};
pub use health::{HealthRecorder, HealthStatus, Staleness};
pub use price::{Observation, PricePoint, PriceRecord, Source, SourcePriority};
pub use reconcile::{Decision, Reconciler, RejectReason};
pub use source::PriceSource;
pub use store::{HealthStore, RecordStore};
