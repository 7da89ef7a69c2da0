//! Logging for Heliox
//!
//! Installs a `tracing-subscriber` registry writing plain text or JSON lines.
//! `RUST_LOG` takes precedence over the configured level.

use heliox_config::{LogFormat, TelemetryConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Build the filter: `RUST_LOG`, then the configured level, then `fallback`
fn build_filter(config: &TelemetryConfig, fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global subscriber
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(config: &TelemetryConfig, default_filter: &str) -> anyhow::Result<()> {
    let filter = build_filter(config, default_filter);
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Text => {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);
            registry.with(layer).try_init()?;
        }
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true);
            registry.with(layer).try_init()?;
        }
    }

    tracing::info!(service = %config.service_name, format = ?config.format, "logging initialized");
    Ok(())
}
