//! Per-source run health and staleness

use super::clock::{Clock, iso_time};
use super::error::StoreError;
use super::price::Source;
use super::store::HealthStore;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of the most recent adapter run for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub source: Source,
    pub timestamp_ms: i64,
    pub iso_time: String,
    pub success_count: usize,
    pub total_instruments: usize,
}

/// The most recent run, from any source, that updated at least one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOk {
    pub timestamp_ms: i64,
    pub iso_time: String,
    pub source: Source,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub last_ok: Option<LastOk>,
    pub per_source: BTreeMap<Source, HealthRecord>,
}

pub struct HealthRecorder {
    store: Arc<dyn HealthStore>,
    clock: Arc<dyn Clock>,
}

impl HealthRecorder {
    pub fn new(store: Arc<dyn HealthStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Overwrites the health record of `source`; moves `last_ok` only when
    /// something succeeded.
    pub async fn record(
        &self,
        source: Source,
        success_count: usize,
        total: usize,
    ) -> Result<HealthRecord, StoreError> {
        let now = self.clock.now_ms();
        let record = HealthRecord {
            source,
            timestamp_ms: now,
            iso_time: iso_time(now),
            success_count,
            total_instruments: total,
        };
        self.store.put_source(&record).await?;
        debug!(%source, success_count, total, "Recorded run health");

        if success_count > 0 {
            let last_ok = LastOk {
                timestamp_ms: now,
                iso_time: record.iso_time.clone(),
                source,
            };
            self.store.put_last_ok(&last_ok).await?;
            info!(%source, "Updated last successful run");
        }
        Ok(record)
    }

    pub async fn status(&self) -> Result<HealthStatus, StoreError> {
        self.store.load().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// No run has succeeded yet.
    NoData,
    Fresh { age: Duration },
    Stale { age: Duration },
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Staleness::Stale { .. })
    }
}

/// Classifies the age of `last_ok`; data is stale once its age reaches `threshold`.
pub fn check_staleness(status: &HealthStatus, now_ms: i64, threshold: Duration) -> Staleness {
    let Some(last_ok) = &status.last_ok else {
        return Staleness::NoData;
    };
    let age = Duration::milliseconds(now_ms - last_ok.timestamp_ms);
    if age >= threshold {
        Staleness::Stale { age }
    } else {
        Staleness::Fresh { age }
    }
}

/// Hours as a fractional number, for display and the alert flag.
pub fn age_hours(age: Duration) -> f64 {
    age.num_milliseconds() as f64 / (60.0 * 60.0 * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::store::memory::MemoryStore;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn recorder(clock: Arc<ManualClock>) -> HealthRecorder {
        HealthRecorder::new(Arc::new(MemoryStore::new()), clock)
    }

    #[tokio::test]
    async fn test_failed_run_does_not_set_last_ok() {
        let clock = Arc::new(ManualClock::new(1_000));
        let health = recorder(clock);

        health.record(Source::Ft, 0, 7).await.unwrap();

        let status = health.status().await.unwrap();
        assert!(status.last_ok.is_none());
        let ft = &status.per_source[&Source::Ft];
        assert_eq!(ft.success_count, 0);
        assert_eq!(ft.total_instruments, 7);
        assert_eq!(ft.timestamp_ms, 1_000);
    }

    #[tokio::test]
    async fn test_last_ok_follows_successful_runs_only() {
        let clock = Arc::new(ManualClock::new(1_000));
        let health = recorder(Arc::clone(&clock));

        health.record(Source::Ft, 0, 7).await.unwrap();
        clock.advance(10);
        health.record(Source::Fundsquare, 3, 7).await.unwrap();

        let status = health.status().await.unwrap();
        let last_ok = status.last_ok.clone().unwrap();
        assert_eq!(last_ok.source, Source::Fundsquare);
        assert_eq!(last_ok.timestamp_ms, 1_010);

        clock.advance(10);
        health.record(Source::Ft, 0, 7).await.unwrap();

        let status = health.status().await.unwrap();
        assert_eq!(status.last_ok, Some(last_ok));
        assert_eq!(status.per_source[&Source::Ft].timestamp_ms, 1_020);
        assert_eq!(status.per_source.len(), 2);
    }

    #[tokio::test]
    async fn test_record_overwrites_previous_run() {
        let clock = Arc::new(ManualClock::new(0));
        let health = recorder(Arc::clone(&clock));

        health.record(Source::Ft, 7, 7).await.unwrap();
        clock.advance(HOUR_MS);
        let record = health.record(Source::Ft, 2, 7).await.unwrap();

        let status = health.status().await.unwrap();
        assert_eq!(status.per_source[&Source::Ft], record);
        assert_eq!(record.iso_time, "1970-01-01T01:00:00+00:00");
        assert_eq!(status.last_ok.unwrap().timestamp_ms, HOUR_MS);
    }

    #[test]
    fn test_check_staleness() {
        let threshold = Duration::hours(20);
        assert_eq!(
            check_staleness(&HealthStatus::default(), 0, threshold),
            Staleness::NoData
        );

        let status = HealthStatus {
            last_ok: Some(LastOk {
                timestamp_ms: 0,
                iso_time: iso_time(0),
                source: Source::Ft,
            }),
            per_source: BTreeMap::new(),
        };
        assert_eq!(
            check_staleness(&status, 19 * HOUR_MS, threshold),
            Staleness::Fresh {
                age: Duration::hours(19)
            }
        );
        assert!(check_staleness(&status, 20 * HOUR_MS, threshold).is_stale());
        assert!(check_staleness(&status, 30 * HOUR_MS, threshold).is_stale());
    }

    #[test]
    fn test_age_hours() {
        assert_eq!(age_hours(Duration::minutes(90)), 1.5);
    }
}
