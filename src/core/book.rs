//! The reconciled, retention-bounded price history of every instrument

use super::clock::Clock;
use super::error::StoreError;
use super::lock::KeyLocks;
use super::price::{Observation, PricePoint, PriceRecord, parse_date, validate_instrument};
use super::reconcile::{Decision, Reconciler, RejectReason};
use super::store::RecordStore;
use chrono::NaiveDate;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};

/// What an [`PriceBook::upsert`] did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    pub changed: bool,
    pub inserted_new_date: bool,
    /// Set when the candidate was not written.
    pub rejection: Option<RejectReason>,
    /// Dates dropped by retention as part of this insert.
    pub evicted: Vec<NaiveDate>,
}

impl UpsertOutcome {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            rejection: Some(reason),
            ..Self::default()
        }
    }
}

pub struct PriceBook {
    store: Arc<dyn RecordStore>,
    reconciler: Reconciler,
    retention: NonZeroUsize,
    clock: Arc<dyn Clock>,
    key_locks: KeyLocks<(String, NaiveDate)>,
    trim_locks: KeyLocks<String>,
}

impl PriceBook {
    pub fn new(
        store: Arc<dyn RecordStore>,
        reconciler: Reconciler,
        retention: NonZeroUsize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            reconciler,
            retention,
            clock,
            key_locks: KeyLocks::new(),
            trim_locks: KeyLocks::new(),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention.get()
    }

    /// Offers `candidate` as the price of `instrument` on `date`.
    ///
    /// Read, decision and write happen under the lock of the `(instrument, date)`
    /// key. Inserting a new date trims the series before returning. A new date
    /// older than a full retention window is rejected without being written.
    pub async fn upsert(
        &self,
        instrument: &str,
        date: NaiveDate,
        candidate: &Observation,
    ) -> Result<UpsertOutcome, StoreError> {
        let instrument = validate_instrument(instrument)?;

        let inserted_new_date = {
            let _guard = self.key_locks.lock((instrument.to_string(), date)).await;
            let existing = self.store.get(instrument, date).await?;

            let mut decision = self.reconciler.decide(existing.as_ref(), candidate);
            if decision == Decision::Replace
                && existing.is_none()
                && self.is_past_window(instrument, date).await?
            {
                decision = Decision::Reject(RejectReason::OutsideRetention);
            }

            match decision {
                Decision::Reject(reason) => {
                    debug!(
                        instrument,
                        %date,
                        close = candidate.close,
                        source = %candidate.source,
                        ?reason,
                        "Rejected price"
                    );
                    return Ok(UpsertOutcome::rejected(reason));
                }
                Decision::Replace => {
                    let record = PriceRecord::replacing(
                        existing.as_ref(),
                        date,
                        candidate,
                        self.clock.now_ms(),
                    );
                    self.store.put(instrument, &record).await?;
                    debug!(
                        instrument,
                        %date,
                        close = record.close,
                        source = %record.source,
                        previous = ?record.previous_source,
                        "Stored price"
                    );
                    existing.is_none()
                }
            }
        };

        let evicted = if inserted_new_date {
            self.trim(instrument).await?
        } else {
            Vec::new()
        };

        Ok(UpsertOutcome {
            changed: true,
            inserted_new_date,
            rejection: None,
            evicted,
        })
    }

    /// [`upsert`](Self::upsert) with the date given as a `YYYY-MM-DD` string.
    pub async fn upsert_str(
        &self,
        instrument: &str,
        date: &str,
        candidate: &Observation,
    ) -> Result<UpsertOutcome, StoreError> {
        validate_instrument(instrument)?;
        let date = parse_date(date)?;
        self.upsert(instrument, date, candidate).await
    }

    /// True when the series already holds `retention` dates, all newer than
    /// `date`. Storing `date` would only have it evicted again.
    async fn is_past_window(&self, instrument: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let dates = self.store.list_dates_descending(instrument).await?;
        Ok(dates
            .get(self.retention.get() - 1)
            .is_some_and(|oldest_kept| date < *oldest_kept))
    }

    /// Drops the oldest dates of `instrument` until at most `retention` remain.
    /// Returns the evicted dates, oldest last.
    pub async fn trim(&self, instrument: &str) -> Result<Vec<NaiveDate>, StoreError> {
        let instrument = validate_instrument(instrument)?;
        let _trim_guard = self.trim_locks.lock(instrument.to_string()).await;

        let dates = self.store.list_dates_descending(instrument).await?;
        let keep = self.retention.get();
        if dates.len() <= keep {
            return Ok(Vec::new());
        }

        let evicted = dates[keep..].to_vec();
        for date in &evicted {
            let _guard = self.key_locks.lock((instrument.to_string(), *date)).await;
            self.store.remove(instrument, *date).await?;
        }
        info!(
            instrument,
            evicted = evicted.len(),
            retained = keep,
            "Trimmed price history"
        );
        Ok(evicted)
    }

    /// The series of `instrument` ordered by date, oldest first.
    pub async fn series(&self, instrument: &str) -> Result<Vec<PricePoint>, StoreError> {
        let instrument = validate_instrument(instrument)?;
        Ok(self
            .store
            .list_records(instrument)
            .await?
            .iter()
            .map(PriceRecord::point)
            .collect())
    }

    pub async fn records(&self, instrument: &str) -> Result<Vec<PriceRecord>, StoreError> {
        let instrument = validate_instrument(instrument)?;
        self.store.list_records(instrument).await
    }

    pub async fn record(
        &self,
        instrument: &str,
        date: NaiveDate,
    ) -> Result<Option<PriceRecord>, StoreError> {
        let instrument = validate_instrument(instrument)?;
        self.store.get(instrument, date).await
    }
}
