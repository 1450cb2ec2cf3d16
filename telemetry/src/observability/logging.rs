//! Structured logging setup
//!
//! JSON output for deployed environments, pretty output for development.
//! `RUST_LOG` overrides the configured level when set.

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::{Result, TelemetryError};

pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

pub(crate) fn is_json(config: &LoggingConfig) -> bool {
    config.format == "json"
}

/// Console layer in the configured format.
///
/// Boxed so that both formats stack onto the same subscriber type.
pub fn fmt_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    if is_json(config) {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .boxed()
    }
}

/// Install the global subscriber without span export.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(build_env_filter(config))
        .with(fmt_layer(config))
        .try_init()
        .map_err(|err| TelemetryError::Internal(anyhow::anyhow!("logging init failed: {err}")))?;

    tracing::info!(json = is_json(config), level = %config.level, "Structured logging initialized");
    Ok(())
}
