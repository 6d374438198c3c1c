//! JSON export of the reconciled series for downstream consumers

use super::book::PriceBook;
use super::config::Fund;
use super::price::PricePoint;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ALL_FUNDS_FILE: &str = "all-funds.json";

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    pub points: usize,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Writes `{isin}.json` (ascending `{date, close}` points) for each fund, plus
/// the combined `all-funds.json`.
pub async fn export_series(
    book: &PriceBook,
    funds: &[Fund],
    out_dir: &Path,
) -> Result<ExportSummary> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create directory: {}", out_dir.display()))?;

    let mut summary = ExportSummary::default();
    let mut all: BTreeMap<&str, Vec<PricePoint>> = BTreeMap::new();

    for fund in funds {
        let series = book
            .series(&fund.isin)
            .await
            .with_context(|| format!("Failed to read series for {}", fund.isin))?;

        let path = out_dir.join(format!("{}.json", fund.isin));
        write_json(&path, &series)?;
        debug!(isin = %fund.isin, points = series.len(), "Exported {}", path.display());

        summary.points += series.len();
        summary.files.push(path);
        all.insert(&fund.isin, series);
    }

    let path = out_dir.join(ALL_FUNDS_FILE);
    write_json(&path, &all)?;
    summary.files.push(path);

    info!(
        files = summary.files.len(),
        points = summary.points,
        "Exported series to {}",
        out_dir.display()
    );
    Ok(summary)
}
