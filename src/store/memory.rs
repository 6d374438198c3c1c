use crate::core::error::StoreError;
use crate::core::health::{HealthRecord, HealthStatus, LastOk};
use crate::core::price::PriceRecord;
use crate::core::store::{HealthStore, RecordStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory store, used by tests.
#[derive(Default)]
pub struct MemoryStore {
    prices: Arc<Mutex<HashMap<String, BTreeMap<NaiveDate, PriceRecord>>>>,
    health: Arc<Mutex<HealthStatus>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(
        &self,
        instrument: &str,
        date: NaiveDate,
    ) -> Result<Option<PriceRecord>, StoreError> {
        let prices = self.prices.lock().await;
        Ok(prices
            .get(instrument)
            .and_then(|series| series.get(&date))
            .cloned())
    }

    async fn put(&self, instrument: &str, record: &PriceRecord) -> Result<(), StoreError> {
        let mut prices = self.prices.lock().await;
        prices
            .entry(instrument.to_string())
            .or_default()
            .insert(record.date, record.clone());
        debug!(instrument, date = %record.date, "Memory PUT");
        Ok(())
    }

    async fn remove(&self, instrument: &str, date: NaiveDate) -> Result<(), StoreError> {
        let mut prices = self.prices.lock().await;
        if let Some(series) = prices.get_mut(instrument) {
            series.remove(&date);
            if series.is_empty() {
                prices.remove(instrument);
            }
        }
        debug!(instrument, %date, "Memory REMOVE");
        Ok(())
    }

    async fn list_dates_descending(&self, instrument: &str) -> Result<Vec<NaiveDate>, StoreError> {
        let prices = self.prices.lock().await;
        Ok(prices
            .get(instrument)
            .map(|series| series.keys().rev().copied().collect())
            .unwrap_or_default())
    }

    async fn list_records(&self, instrument: &str) -> Result<Vec<PriceRecord>, StoreError> {
        let prices = self.prices.lock().await;
        Ok(prices
            .get(instrument)
            .map(|series| series.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl HealthStore for MemoryStore {
    async fn put_source(&self, record: &HealthRecord) -> Result<(), StoreError> {
        let mut health = self.health.lock().await;
        health.per_source.insert(record.source, record.clone());
        Ok(())
    }

    async fn put_last_ok(&self, last_ok: &LastOk) -> Result<(), StoreError> {
        let mut health = self.health.lock().await;
        health.last_ok = Some(last_ok.clone());
        Ok(())
    }

    async fn load(&self) -> Result<HealthStatus, StoreError> {
        Ok(self.health.lock().await.clone())
    }
}

/// Memory store whose writes fail with an I/O error once `puts` writes went through.
#[cfg(test)]
pub(crate) struct FailingStore {
    pub(crate) inner: MemoryStore,
    puts_left: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl FailingStore {
    pub(crate) fn after_puts(puts: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            puts_left: std::sync::atomic::AtomicUsize::new(puts),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl RecordStore for FailingStore {
    async fn get(
        &self,
        instrument: &str,
        date: NaiveDate,
    ) -> Result<Option<PriceRecord>, StoreError> {
        self.inner.get(instrument, date).await
    }

    async fn put(&self, instrument: &str, record: &PriceRecord) -> Result<(), StoreError> {
        use std::sync::atomic::Ordering;
        self.puts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| std::io::Error::other("disk full"))?;
        self.inner.put(instrument, record).await
    }

    async fn remove(&self, instrument: &str, date: NaiveDate) -> Result<(), StoreError> {
        self.inner.remove(instrument, date).await
    }

    async fn list_dates_descending(&self, instrument: &str) -> Result<Vec<NaiveDate>, StoreError> {
        self.inner.list_dates_descending(instrument).await
    }

    async fn list_records(&self, instrument: &str) -> Result<Vec<PriceRecord>, StoreError> {
        self.inner.list_records(instrument).await
    }
}
