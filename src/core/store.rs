//! Storage abstractions for price series and health records

use super::error::StoreError;
use super::health::{HealthRecord, HealthStatus, LastOk};
use super::price::PriceRecord;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Keyed storage of price records, one per `(instrument, date)`.
///
/// Implementations only move bytes; arbitration and retention live in
/// [`PriceBook`](super::book::PriceBook).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(
        &self,
        instrument: &str,
        date: NaiveDate,
    ) -> Result<Option<PriceRecord>, StoreError>;

    /// Inserts or overwrites the record stored under `(instrument, record.date)`.
    async fn put(&self, instrument: &str, record: &PriceRecord) -> Result<(), StoreError>;

    async fn remove(&self, instrument: &str, date: NaiveDate) -> Result<(), StoreError>;

    /// All stored dates for `instrument`, newest first.
    async fn list_dates_descending(&self, instrument: &str) -> Result<Vec<NaiveDate>, StoreError>;

    /// All stored records for `instrument`, oldest first.
    async fn list_records(&self, instrument: &str) -> Result<Vec<PriceRecord>, StoreError>;
}

/// Storage of the per-source run outcomes and the global `last_ok` pointer.
///
/// Each write touches a single key so concurrent writers for different
/// sources never clobber each other.
#[async_trait]
pub trait HealthStore: Send + Sync {
    async fn put_source(&self, record: &HealthRecord) -> Result<(), StoreError>;

    async fn put_last_ok(&self, last_ok: &LastOk) -> Result<(), StoreError>;

    async fn load(&self) -> Result<HealthStatus, StoreError>;
}
