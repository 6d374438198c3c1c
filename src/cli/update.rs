use super::ui;
use crate::core::book::PriceBook;
use crate::core::config::AppConfig;
use crate::core::health::HealthRecorder;
use crate::core::price::Source;
use crate::core::source::PriceSource;
use crate::core::update::{RunSummary, run_update};
use crate::providers::{FtProvider, FundsquareProvider};
use anyhow::{Result, bail};
use comfy_table::Cell;
use futures::future::join_all;
use std::fmt::{self, Display};
use std::time::Duration;

/// Which adapters an `update` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceSelection {
    Ft,
    Fundsquare,
    All,
}

impl Display for SourceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceSelection::Ft => "ft",
            SourceSelection::Fundsquare => "fundsquare",
            SourceSelection::All => "all",
        };
        f.write_str(name)
    }
}

impl SourceSelection {
    fn includes(self, source: Source) -> bool {
        match self {
            SourceSelection::All => true,
            SourceSelection::Ft => source == Source::Ft,
            SourceSelection::Fundsquare => source == Source::Fundsquare,
        }
    }
}

struct Run {
    source: Box<dyn PriceSource>,
    delay: Duration,
}

fn build_runs(config: &AppConfig, selection: SourceSelection) -> Result<Vec<Run>> {
    let mut runs = Vec::new();
    let timeout = config.request_timeout();

    if selection.includes(Source::Ft) {
        match &config.providers.ft {
            Some(ft) => runs.push(Run {
                source: Box::new(FtProvider::new(&ft.base_url, timeout)?),
                delay: Duration::from_millis(ft.request_delay_ms),
            }),
            None if selection == SourceSelection::Ft => bail!("FT provider is not configured"),
            None => {}
        }
    }
    if selection.includes(Source::Fundsquare) {
        match &config.providers.fundsquare {
            Some(fs) => runs.push(Run {
                source: Box::new(FundsquareProvider::new(&fs.base_url, timeout)?),
                delay: Duration::from_millis(fs.request_delay_ms),
            }),
            None if selection == SourceSelection::Fundsquare => {
                bail!("Fundsquare provider is not configured")
            }
            None => {}
        }
    }

    if runs.is_empty() {
        bail!("No provider configured for source selection '{selection}'");
    }
    Ok(runs)
}

/// Runs the selected adapters concurrently against the same book.
///
/// Fails when any selected source could not update a single fund.
pub async fn run(
    config: &AppConfig,
    selection: SourceSelection,
    book: &PriceBook,
    health: &HealthRecorder,
) -> Result<()> {
    if config.funds.is_empty() {
        println!("No funds configured.");
        return Ok(());
    }

    let runs = build_runs(config, selection)?;
    let pb = ui::new_spinner(&format!(
        "Updating {} funds from {selection}...",
        config.funds.len()
    ));
    let results = join_all(
        runs.iter()
            .map(|r| run_update(r.source.as_ref(), &config.funds, book, health, r.delay)),
    )
    .await;
    pb.finish_and_clear();

    let summaries = results.into_iter().collect::<Result<Vec<_>>>()?;
    for summary in &summaries {
        display_summary(summary);
    }

    let failed: Vec<String> = summaries
        .iter()
        .filter(|s| s.is_total_failure())
        .map(|s| s.source.to_string())
        .collect();
    if !failed.is_empty() {
        bail!("No funds were updated from {}", failed.join(", "));
    }
    Ok(())
}

fn display_summary(summary: &RunSummary) {
    println!(
        "\nSource: {}",
        ui::style_text(summary.source.as_str(), ui::StyleType::Title)
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Fund"),
        ui::header_cell("Fetched"),
        ui::header_cell("Updated"),
        ui::header_cell("New dates"),
        ui::header_cell("Status"),
    ]);

    for fund in &summary.funds {
        let row = vec![
            Cell::new(&fund.isin),
            ui::number_cell(fund.update.fetched),
            ui::number_cell(fund.update.updated),
            ui::number_cell(fund.update.new_dates),
            ui::status_cell(fund.error.as_deref()),
        ];
        table.add_row(row);
    }
    println!("{table}");

    let totals = format!(
        "{}/{} funds updated, {} prices changed, {} new dates",
        summary.success_count(),
        summary.total(),
        summary.updated(),
        summary.new_dates()
    );
    let style_type = if summary.is_total_failure() {
        ui::StyleType::Error
    } else if summary.success_count() < summary.total() {
        ui::StyleType::Warning
    } else {
        ui::StyleType::Success
    };
    println!("{}", ui::style_text(&totals, style_type));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProvidersConfig;

    fn config(providers: ProvidersConfig) -> AppConfig {
        let mut config: AppConfig = serde_yaml::from_str("funds: []").unwrap();
        config.providers = providers;
        config
    }

    #[test]
    fn test_build_runs_for_selection() {
        let config = config(ProvidersConfig::default());
        assert_eq!(build_runs(&config, SourceSelection::All).unwrap().len(), 2);

        let ft = build_runs(&config, SourceSelection::Ft).unwrap();
        assert_eq!(ft.len(), 1);
        assert_eq!(ft[0].delay, Duration::from_millis(2000));

        let fundsquare = build_runs(&config, SourceSelection::Fundsquare).unwrap();
        assert_eq!(fundsquare[0].delay, Duration::ZERO);
    }

    #[test]
    fn test_build_runs_without_provider() {
        let config = config(ProvidersConfig {
            ft: None,
            fundsquare: None,
        });
        let err = build_runs(&config, SourceSelection::Ft).err().unwrap();
        assert_eq!(err.to_string(), "FT provider is not configured");
        assert!(build_runs(&config, SourceSelection::All).is_err());
    }
}
