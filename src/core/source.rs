//! Upstream price sources

use super::config::Fund;
use super::price::{DatedObservation, Source};
use anyhow::Result;
use async_trait::async_trait;

/// A web source that turns a fund into normalized, dated observations.
///
/// Implementations must not touch the store: fetching happens outside any
/// store lock and the caller feeds the observations to the price book.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn source(&self) -> Source;

    async fn fetch_observations(&self, fund: &Fund) -> Result<Vec<DatedObservation>>;
}
