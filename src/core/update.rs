//! One adapter run over every tracked fund

use super::book::PriceBook;
use super::config::Fund;
use super::health::HealthRecorder;
use super::price::{DatedObservation, Source};
use super::source::PriceSource;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Counts for one fund.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FundUpdate {
    pub fetched: usize,
    pub updated: usize,
    pub new_dates: usize,
    /// Observations refused as invalid input.
    pub invalid: usize,
    pub evicted: usize,
}

/// The result of one fund. Counts cover everything written before a failure.
#[derive(Debug)]
pub struct FundOutcome {
    pub isin: String,
    pub update: FundUpdate,
    pub error: Option<String>,
}

impl FundOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub source: Source,
    pub funds: Vec<FundOutcome>,
}

impl RunSummary {
    pub fn success_count(&self) -> usize {
        self.funds.iter().filter(|f| f.is_success()).count()
    }

    pub fn total(&self) -> usize {
        self.funds.len()
    }

    pub fn updated(&self) -> usize {
        self.funds.iter().map(|f| f.update.updated).sum()
    }

    pub fn new_dates(&self) -> usize {
        self.funds.iter().map(|f| f.update.new_dates).sum()
    }

    /// Nothing at all could be updated from the source.
    pub fn is_total_failure(&self) -> bool {
        self.success_count() == 0
    }
}

async fn apply_observations(
    fund: &Fund,
    observations: &[DatedObservation],
    book: &PriceBook,
    update: &mut FundUpdate,
) -> Result<()> {
    for DatedObservation { date, observation } in observations {
        match book.upsert(&fund.isin, *date, observation).await {
            Ok(outcome) => {
                if outcome.changed {
                    update.updated += 1;
                }
                if outcome.inserted_new_date {
                    update.new_dates += 1;
                }
                update.evicted += outcome.evicted.len();
            }
            Err(err) if !err.is_storage() => {
                warn!(isin = %fund.isin, %date, "Skipping observation: {err}");
                update.invalid += 1;
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to store price for {} on {date}", fund.isin)
                });
            }
        }
    }
    Ok(())
}

/// Fetches `fund` from `source` and offers every observation to the book.
///
/// Invalid observations are skipped; a storage failure ends the fund with an
/// error, keeping whatever was already written.
pub async fn update_fund(source: &dyn PriceSource, fund: &Fund, book: &PriceBook) -> FundOutcome {
    let mut update = FundUpdate::default();
    let result = match source.fetch_observations(fund).await {
        Ok(observations) => {
            update.fetched = observations.len();
            apply_observations(fund, &observations, book, &mut update).await
        }
        Err(err) => Err(err),
    };

    let source = source.source();
    match &result {
        Ok(()) if update.updated > 0 => info!(
            %source,
            isin = %fund.isin,
            "Updated {} prices ({} new dates)",
            update.updated,
            update.new_dates
        ),
        Ok(()) => debug!(
            %source,
            isin = %fund.isin,
            "No changes, all {} prices already stored",
            update.fetched
        ),
        Err(err) => warn!(
            %source,
            isin = %fund.isin,
            updated = update.updated,
            "Update failed: {err:#}"
        ),
    }

    FundOutcome {
        isin: fund.isin.clone(),
        update,
        error: result.err().map(|e| format!("{e:#}")),
    }
}

/// Runs `source` over all `funds` in order, then records the run's health.
pub async fn run_update(
    source: &dyn PriceSource,
    funds: &[Fund],
    book: &PriceBook,
    health: &HealthRecorder,
    delay_between_funds: Duration,
) -> Result<RunSummary> {
    let name = source.source();
    info!(source = %name, funds = funds.len(), "Update started");

    let mut outcomes = Vec::with_capacity(funds.len());
    for (i, fund) in funds.iter().enumerate() {
        if i > 0 && !delay_between_funds.is_zero() {
            tokio::time::sleep(delay_between_funds).await;
        }
        outcomes.push(update_fund(source, fund, book).await);
    }

    let summary = RunSummary {
        source: name,
        funds: outcomes,
    };
    health
        .record(name, summary.success_count(), summary.total())
        .await
        .with_context(|| format!("Failed to record health for {name}"))?;

    if summary.is_total_failure() {
        error!(source = %name, "No funds were updated");
    } else {
        info!(
            source = %name,
            "Update completed: {}/{} funds, {} prices updated, {} new dates",
            summary.success_count(),
            summary.total(),
            summary.updated(),
            summary.new_dates()
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::price::{Observation, SourcePriority, parse_date};
    use crate::core::reconcile::Reconciler;
    use crate::core::store::RecordStore;
    use crate::store::memory::{FailingStore, MemoryStore};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    struct MockSource {
        source: Source,
        prices: HashMap<String, Vec<(&'static str, f64)>>,
    }

    #[async_trait]
    impl PriceSource for MockSource {
        fn source(&self) -> Source {
            self.source
        }

        async fn fetch_observations(&self, fund: &Fund) -> Result<Vec<DatedObservation>> {
            let prices = self
                .prices
                .get(&fund.isin)
                .ok_or_else(|| anyhow!("Timeout"))?;
            Ok(prices
                .iter()
                .map(|(date, close)| DatedObservation {
                    date: parse_date(date).unwrap(),
                    observation: Observation::new(*close, self.source),
                })
                .collect())
        }
    }

    fn fund(isin: &str) -> Fund {
        Fund {
            isin: isin.to_string(),
            ft: Some(format!("{isin}:EUR")),
            fundsquare: Some("1".to_string()),
        }
    }

    fn setup() -> (PriceBook, HealthRecorder) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let book = PriceBook::new(
            store.clone(),
            Reconciler::new(SourcePriority::default()),
            NonZeroUsize::new(3).unwrap(),
            clock.clone(),
        );
        (book, HealthRecorder::new(store, clock))
    }

    #[tokio::test]
    async fn test_partial_failure_is_counted() {
        let (book, health) = setup();
        let source = MockSource {
            source: Source::Ft,
            prices: HashMap::from([(
                "A1".to_string(),
                vec![
                    ("2026-01-01", 1.0),
                    ("2026-01-02", 2.0),
                    ("2026-01-03", 0.0),
                ],
            )]),
        };
        let funds = [fund("A1"), fund("B2")];

        let summary = run_update(&source, &funds, &book, &health, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(summary.success_count(), 1);
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.updated(), 2);
        assert_eq!(summary.new_dates(), 2);
        assert!(!summary.is_total_failure());
        assert_eq!(summary.funds[1].error.as_deref(), Some("Timeout"));

        let status = health.status().await.unwrap();
        assert_eq!(status.per_source[&Source::Ft].success_count, 1);
        assert_eq!(status.per_source[&Source::Ft].total_instruments, 2);
        assert_eq!(status.last_ok.unwrap().source, Source::Ft);
    }

    #[tokio::test]
    async fn test_total_failure_leaves_last_ok_alone() {
        let (book, health) = setup();
        let source = MockSource {
            source: Source::Fundsquare,
            prices: HashMap::new(),
        };

        let summary = run_update(&source, &[fund("A1")], &book, &health, Duration::ZERO)
            .await
            .unwrap();

        assert!(summary.is_total_failure());
        let status = health.status().await.unwrap();
        assert_eq!(status.per_source[&Source::Fundsquare].success_count, 0);
        assert!(status.last_ok.is_none());
    }

    #[tokio::test]
    async fn test_rerun_changes_nothing() {
        let (book, _) = setup();
        let source = MockSource {
            source: Source::Ft,
            prices: HashMap::from([(
                "A1".to_string(),
                vec![("2026-01-01", 1.0), ("2026-01-02", 2.0)],
            )]),
        };

        let first = update_fund(&source, &fund("A1"), &book).await;
        assert!(first.is_success());
        assert_eq!(first.update.updated, 2);

        let second = update_fund(&source, &fund("A1"), &book).await;
        assert!(second.is_success());
        assert_eq!(second.update.fetched, 2);
        assert_eq!(second.update.updated, 0);
        assert_eq!(second.update.new_dates, 0);
    }

    #[tokio::test]
    async fn test_invalid_instrument_is_skipped_not_fatal() {
        let (book, _) = setup();
        let source = MockSource {
            source: Source::Ft,
            prices: HashMap::from([("BAD CODE".to_string(), vec![("2026-01-01", 1.0)])]),
        };

        let outcome = update_fund(&source, &fund("BAD CODE"), &book).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.update.invalid, 1);
        assert_eq!(outcome.update.updated, 0);
    }

    #[tokio::test]
    async fn test_retention_is_reported() {
        let (book, _) = setup();
        let source = MockSource {
            source: Source::Ft,
            prices: HashMap::from([(
                "A1".to_string(),
                vec![
                    ("2026-01-01", 1.0),
                    ("2026-01-02", 2.0),
                    ("2026-01-03", 3.0),
                    ("2026-01-04", 4.0),
                    ("2026-01-05", 5.0),
                ],
            )]),
        };

        let outcome = update_fund(&source, &fund("A1"), &book).await;
        assert_eq!(outcome.update.new_dates, 5);
        assert_eq!(outcome.update.evicted, 2);
        assert_eq!(book.series("A1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_dates_behind_a_full_window_are_not_counted() {
        let (book, _) = setup();
        let source = MockSource {
            source: Source::Ft,
            prices: HashMap::from([(
                "A1".to_string(),
                vec![
                    ("2026-01-05", 5.0),
                    ("2026-01-04", 4.0),
                    ("2026-01-03", 3.0),
                    ("2026-01-02", 2.0),
                    ("2026-01-01", 1.0),
                ],
            )]),
        };

        let first = update_fund(&source, &fund("A1"), &book).await;
        assert_eq!(first.update.updated, 3);
        assert_eq!(first.update.new_dates, 3);
        assert_eq!(first.update.evicted, 0);

        let second = update_fund(&source, &fund("A1"), &book).await;
        assert_eq!(second.update.updated, 0);
        assert_eq!(second.update.new_dates, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_fund_and_keeps_counts() {
        let store = Arc::new(FailingStore::after_puts(1));
        let clock = Arc::new(ManualClock::new(1_000));
        let book = PriceBook::new(
            store.clone(),
            Reconciler::new(SourcePriority::default()),
            NonZeroUsize::new(3).unwrap(),
            clock.clone(),
        );
        let health = HealthRecorder::new(Arc::new(MemoryStore::new()), clock);
        let source = MockSource {
            source: Source::Ft,
            prices: HashMap::from([(
                "A1".to_string(),
                vec![("2026-01-01", 1.0), ("2026-01-02", 2.0)],
            )]),
        };

        let summary = run_update(&source, &[fund("A1")], &book, &health, Duration::ZERO)
            .await
            .unwrap();

        let outcome = &summary.funds[0];
        assert!(!outcome.is_success());
        assert!(outcome.error.as_deref().unwrap().contains("disk full"));
        assert_eq!(outcome.update.fetched, 2);
        assert_eq!(outcome.update.updated, 1);
        assert_eq!(outcome.update.new_dates, 1);
        assert_eq!(outcome.update.invalid, 0);
        assert_eq!(summary.updated(), 1);
        assert!(summary.is_total_failure());
        assert_eq!(store.inner.list_records("A1").await.unwrap().len(), 1);

        let status = health.status().await.unwrap();
        assert_eq!(status.per_source[&Source::Ft].success_count, 0);
        assert_eq!(status.per_source[&Source::Ft].total_instruments, 1);
    }
}
