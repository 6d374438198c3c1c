use crate::core::error::StoreError;
use crate::core::health::{HealthRecord, HealthStatus, LastOk};
use crate::core::price::{DATE_FORMAT, PriceRecord};
use crate::core::store::{HealthStore, RecordStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::fs::{File, OpenOptions, TryLockError};
use std::path::Path;
use tracing::{debug, warn};

const PRICES_PARTITION: &str = "prices";
const HEALTH_PARTITION: &str = "health";
const SOURCE_KEY_PREFIX: &str = "source:";
const LAST_OK_KEY: &str = "last_ok";
const LOCK_FILE: &str = "LOCK";
const KEYSPACE_DIR: &str = "fjall_db";

/// fjall-backed store.
///
/// Prices live in one partition keyed `{instrument}/{YYYY-MM-DD}`, so a prefix
/// scan walks one instrument's dates in calendar order. Health lives in a
/// second partition keyed `source:{name}` plus `last_ok`.
///
/// An exclusive lock on `{path}/LOCK` is held for the store's lifetime, so a
/// second process fails to open the same directory instead of interleaving
/// its read-decide-write steps with ours.
pub struct DiskStore {
    keyspace: Keyspace,
    prices: PartitionHandle,
    health: PartitionHandle,
    // Released on drop, after the keyspace is closed.
    _lock: File,
}

impl DiskStore {
    /// Opens the store at `path`, or returns [`StoreError::Locked`] when another
    /// handle already holds it.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)?;
        let lock = lock_dir(path)?;
        let keyspace = fjall::Config::new(path.join(KEYSPACE_DIR)).open()?;
        let prices = keyspace.open_partition(PRICES_PARTITION, PartitionCreateOptions::default())?;
        let health = keyspace.open_partition(HEALTH_PARTITION, PartitionCreateOptions::default())?;
        debug!("Opened price store at {}", path.display());
        Ok(Self {
            keyspace,
            prices,
            health,
            _lock: lock,
        })
    }

    /// Flushes the journal to disk.
    pub fn persist(&self) -> Result<(), StoreError> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

fn lock_dir(path: &Path) -> Result<File, StoreError> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path.join(LOCK_FILE))?;
    match file.try_lock() {
        Ok(()) => Ok(file),
        Err(TryLockError::WouldBlock) => Err(StoreError::Locked {
            path: path.to_path_buf(),
        }),
        Err(TryLockError::Error(e)) => Err(e.into()),
    }
}

fn series_prefix(instrument: &str) -> String {
    format!("{instrument}/")
}

fn price_key(instrument: &str, date: NaiveDate) -> String {
    format!("{instrument}/{}", date.format(DATE_FORMAT))
}

fn date_from_key(key: &[u8], prefix_len: usize) -> Option<NaiveDate> {
    let suffix = std::str::from_utf8(key.get(prefix_len..)?).ok()?;
    NaiveDate::parse_from_str(suffix, DATE_FORMAT).ok()
}

#[async_trait]
impl RecordStore for DiskStore {
    async fn get(
        &self,
        instrument: &str,
        date: NaiveDate,
    ) -> Result<Option<PriceRecord>, StoreError> {
        match self.prices.get(price_key(instrument, date))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, instrument: &str, record: &PriceRecord) -> Result<(), StoreError> {
        let key = price_key(instrument, record.date);
        self.prices
            .insert(key.as_bytes(), serde_json::to_vec(record)?)?;
        debug!("Store PUT for key: {}", key);
        Ok(())
    }

    async fn remove(&self, instrument: &str, date: NaiveDate) -> Result<(), StoreError> {
        let key = price_key(instrument, date);
        self.prices.remove(key.as_bytes())?;
        debug!("Store REMOVE for key: {}", key);
        Ok(())
    }

    async fn list_dates_descending(&self, instrument: &str) -> Result<Vec<NaiveDate>, StoreError> {
        let prefix = series_prefix(instrument);
        let mut dates = Vec::new();
        for item in self.prices.prefix(&prefix).rev() {
            let (key, _) = item?;
            match date_from_key(&key, prefix.len()) {
                Some(date) => dates.push(date),
                None => warn!(
                    "Skipping malformed price key: {:?}",
                    String::from_utf8_lossy(&key)
                ),
            }
        }
        Ok(dates)
    }

    async fn list_records(&self, instrument: &str) -> Result<Vec<PriceRecord>, StoreError> {
        let prefix = series_prefix(instrument);
        let mut records = Vec::new();
        for item in self.prices.prefix(&prefix) {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl HealthStore for DiskStore {
    async fn put_source(&self, record: &HealthRecord) -> Result<(), StoreError> {
        let key = format!("{SOURCE_KEY_PREFIX}{}", record.source);
        self.health
            .insert(key.as_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    async fn put_last_ok(&self, last_ok: &LastOk) -> Result<(), StoreError> {
        self.health
            .insert(LAST_OK_KEY.as_bytes(), serde_json::to_vec(last_ok)?)?;
        Ok(())
    }

    async fn load(&self) -> Result<HealthStatus, StoreError> {
        let mut status = HealthStatus::default();
        if let Some(value) = self.health.get(LAST_OK_KEY)? {
            status.last_ok = Some(serde_json::from_slice(&value)?);
        }
        for item in self.health.prefix(SOURCE_KEY_PREFIX) {
            let (_, value) = item?;
            let record: HealthRecord = serde_json::from_slice(&value)?;
            status.per_source.insert(record.source, record);
        }
        Ok(status)
    }
}
