use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use navkeep::SourceSelection;
use navkeep::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for navkeep::AppCommand {
    fn from(cmd: Commands) -> navkeep::AppCommand {
        match cmd {
            Commands::Update { source } => navkeep::AppCommand::Update { source },
            Commands::Export { out } => navkeep::AppCommand::Export { out },
            Commands::Health => navkeep::AppCommand::Health,
            Commands::History { isin, limit } => navkeep::AppCommand::History { isin, limit },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch prices and reconcile them into the store
    Update {
        /// Source to fetch from
        #[arg(short, long, value_enum, default_value_t = SourceSelection::All)]
        source: SourceSelection,
    },
    /// Write each fund's series as JSON
    Export {
        /// Output directory, defaults to `export_path` from the config
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Check data freshness and raise or clear the alert flag
    Health,
    /// Show the most recent stored prices of a fund
    History {
        isin: String,
        /// Number of dates to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => navkeep::cli::setup::setup_at_path(path),
            None => navkeep::cli::setup::setup(),
        },
        Some(cmd) => navkeep::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
