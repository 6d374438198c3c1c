use super::ui;
use crate::core::book::PriceBook;
use crate::core::clock::iso_time;
use anyhow::{Context, Result};
use comfy_table::Cell;

/// Prints the most recent `limit` records of `isin`, newest first.
pub async fn run(book: &PriceBook, isin: &str, limit: usize) -> Result<()> {
    let records = book
        .records(isin)
        .await
        .with_context(|| format!("Failed to read history for {isin}"))?;

    if records.is_empty() {
        println!("No prices stored for {isin}.");
        return Ok(());
    }

    println!(
        "\nFund: {} ({} of {} stored dates, retention {})",
        ui::style_text(isin, ui::StyleType::Title),
        limit.min(records.len()),
        records.len(),
        book.retention()
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Close"),
        ui::header_cell("Source"),
        ui::header_cell("Updated"),
        ui::header_cell("Previous"),
    ]);

    for record in records.iter().rev().take(limit) {
        let previous = match (record.previous_source, record.previous_close) {
            (Some(source), Some(close)) => Some(format!("{close:.4} ({source})")),
            _ => None,
        };
        table.add_row(vec![
            Cell::new(record.date),
            ui::price_cell(record.close),
            Cell::new(record.source),
            Cell::new(iso_time(record.updated_at_ms)),
            ui::format_optional_cell(previous, |p| p),
        ]);
    }
    println!("{table}");
    Ok(())
}
