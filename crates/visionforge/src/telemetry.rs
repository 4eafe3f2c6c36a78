//! Process-wide logging setup.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a plain
//! or JSON formatter, and bridges `log` records (used by the database layer)
//! into tracing.

use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Builds the filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes global logging. Returns an error if a subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .boxed()
    };

    let subscriber =
        tracing_subscriber::registry().with(fmt_layer.with_filter(env_filter(&config.level)));
    tracing::subscriber::set_global_default(subscriber)?;

    tracing_log::LogTracer::init()?;

    Ok(())
}
