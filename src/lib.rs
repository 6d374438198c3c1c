pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

pub use cli::update::SourceSelection;

use crate::core::clock::{Clock, SystemClock};
use crate::core::config::AppConfig;
use crate::core::{HealthRecorder, PriceBook, Reconciler};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Update { source: SourceSelection },
    Export { out: Option<PathBuf> },
    Health,
    History { isin: String, limit: usize },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("navkeep starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = store::open_disk_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let book = PriceBook::new(
        store.clone(),
        Reconciler::new(config.source_priority),
        config.retention()?,
        clock.clone(),
    );
    let health = HealthRecorder::new(store.clone(), clock.clone());

    let result = match command {
        AppCommand::Update { source } => cli::update::run(&config, source, &book, &health).await,
        AppCommand::Export { out } => {
            let out_dir = match out {
                Some(dir) => dir,
                None => config.default_export_path()?,
            };
            cli::export::run(&book, &config.funds, &out_dir).await
        }
        AppCommand::Health => {
            cli::health::run(
                &health,
                clock.as_ref(),
                config.stale_after(),
                &config.default_data_path()?,
            )
            .await
        }
        AppCommand::History { isin, limit } => cli::history::run(&book, &isin, limit).await,
    };

    // Flush whatever the command wrote, even if it later failed.
    store.persist()?;
    result
}
