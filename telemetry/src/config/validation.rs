use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use garde::Validate;
use std::path::Path;

use super::TelemetryConfig;
use crate::error::Result;

pub const DEFAULT_CONFIG_PATH: &str = "config/telemetry.toml";
pub const ENV_PREFIX: &str = "TELEMETRY_";

/// Tiered configuration sources, lowest priority first
pub fn figment(path: Option<&Path>) -> Figment {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

    Figment::new()
        // 1. Embedded defaults
        .merge(Serialized::defaults(TelemetryConfig::default()))
        // 2. Config file, skipped when missing
        .merge(Toml::file(path))
        // 3. Environment variables, e.g. TELEMETRY_EXPORTER__SAMPLE_RATE
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate configuration
pub fn load_config(path: Option<&Path>) -> Result<TelemetryConfig> {
    from_figment(figment(path))
}

pub fn from_figment(figment: Figment) -> Result<TelemetryConfig> {
    let config: TelemetryConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
