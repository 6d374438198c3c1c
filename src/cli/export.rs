use crate::core::book::PriceBook;
use crate::core::config::Fund;
use crate::core::export::export_series;
use anyhow::Result;
use std::path::Path;

pub async fn run(book: &PriceBook, funds: &[Fund], out_dir: &Path) -> Result<()> {
    let summary = export_series(book, funds, out_dir).await?;
    println!(
        "Exported {} prices for {} funds to {}",
        summary.points,
        funds.len(),
        out_dir.display()
    );
    Ok(())
}
