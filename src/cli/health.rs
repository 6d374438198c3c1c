use super::ui;
use crate::core::clock::{Clock, iso_time};
use crate::core::health::{
    HealthRecorder, HealthStatus, LastOk, Staleness, age_hours, check_staleness,
};
use anyhow::{Context, Result};
use comfy_table::Cell;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

pub const ALERT_FLAG_FILE: &str = "health_alert_needed.flag";

/// Contents of the alert flag picked up by external notifiers.
#[derive(Debug, Serialize)]
struct AlertFlag<'a> {
    timestamp: i64,
    iso: String,
    last_ok: &'a LastOk,
    age_hours: f64,
    threshold_hours: f64,
}

#[derive(Debug, PartialEq, Eq)]
enum FlagChange {
    Written,
    Removed,
    Unchanged,
}

/// Writes the flag when stale, removes it when fresh. No data leaves it alone.
fn sync_alert_flag(
    flag_path: &Path,
    status: &HealthStatus,
    staleness: Staleness,
    now_ms: i64,
    threshold: chrono::Duration,
) -> Result<FlagChange> {
    match (staleness, &status.last_ok) {
        (Staleness::Stale { age }, Some(last_ok)) => {
            let flag = AlertFlag {
                timestamp: now_ms,
                iso: iso_time(now_ms),
                last_ok,
                age_hours: age_hours(age),
                threshold_hours: age_hours(threshold),
            };
            if let Some(parent) = flag_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            std::fs::write(flag_path, serde_json::to_string_pretty(&flag)?)
                .with_context(|| format!("Failed to write alert flag {}", flag_path.display()))?;
            Ok(FlagChange::Written)
        }
        (Staleness::Fresh { .. }, _) if flag_path.exists() => {
            std::fs::remove_file(flag_path)
                .with_context(|| format!("Failed to remove alert flag {}", flag_path.display()))?;
            Ok(FlagChange::Removed)
        }
        _ => Ok(FlagChange::Unchanged),
    }
}

/// Reports per-source health and the staleness of the last successful run.
pub async fn run(
    health: &HealthRecorder,
    clock: &dyn Clock,
    threshold: chrono::Duration,
    data_dir: &Path,
) -> Result<()> {
    let status = health
        .status()
        .await
        .context("Failed to read health record")?;
    let now_ms = clock.now_ms();
    let staleness = check_staleness(&status, now_ms, threshold);

    display_sources(&status);

    let threshold_hours = age_hours(threshold);
    match staleness {
        Staleness::NoData => println!(
            "{}",
            ui::style_text("No successful updates recorded yet", ui::StyleType::Warning)
        ),
        Staleness::Fresh { age } => println!(
            "{}",
            ui::style_text(
                &format!(
                    "Data is fresh ({:.2} hours old, threshold {threshold_hours}h)",
                    age_hours(age)
                ),
                ui::StyleType::Success
            )
        ),
        Staleness::Stale { age } => {
            warn!(age_hours = age_hours(age), "Data is stale");
            println!(
                "{}",
                ui::style_text(
                    &format!(
                        "Data is STALE ({:.2} hours old, threshold {threshold_hours}h)",
                        age_hours(age)
                    ),
                    ui::StyleType::Error
                )
            );
        }
    }

    let flag_path = data_dir.join(ALERT_FLAG_FILE);
    match sync_alert_flag(&flag_path, &status, staleness, now_ms, threshold)? {
        FlagChange::Written => {
            info!("Created alert flag {}", flag_path.display());
            println!("Created alert flag: {}", flag_path.display());
        }
        FlagChange::Removed => {
            info!("Removed alert flag {}", flag_path.display());
            println!("Removed alert flag (data is now fresh)");
        }
        FlagChange::Unchanged => {}
    }
    Ok(())
}

fn display_sources(status: &HealthStatus) {
    let last_ok = status.last_ok.as_ref().map_or_else(
        || "never".to_string(),
        |ok| format!("{} ({})", ok.iso_time, ok.source),
    );
    println!(
        "Last OK: {}",
        ui::style_text(&last_ok, ui::StyleType::Subtle)
    );

    if status.per_source.is_empty() {
        return;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Source"),
        ui::header_cell("Last run"),
        ui::header_cell("Succeeded"),
        ui::header_cell("Total"),
    ]);
    for record in status.per_source.values() {
        let succeeded = if record.success_count == 0 {
            Cell::new(record.success_count).fg(comfy_table::Color::Red)
        } else {
            ui::number_cell(record.success_count)
        };
        table.add_row(vec![
            Cell::new(record.source),
            Cell::new(&record.iso_time),
            succeeded,
            ui::number_cell(record.total_instruments),
        ]);
    }
    println!("{table}");
}
