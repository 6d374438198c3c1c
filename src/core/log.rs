use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Warnings and errors always reach stderr; `--verbose` adds the per-record
/// decisions at debug level. `RUST_LOG` overrides the default filter.
pub fn init_logging(verbose: bool) {
    let (level_filter, level) = if verbose {
        (LevelFilter::DEBUG, "debug")
    } else {
        (LevelFilter::WARN, "warn")
    };
    let app_filter = Targets::new().with_target("navkeep", level_filter);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr = fmt::layer().with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(stderr.pretty().without_time())
        .with(app_filter)
        .with(env_filter)
        .init();
}
