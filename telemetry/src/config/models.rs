use garde::Validate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::sanitization::{EndpointClassifier, RedactionRule, Redactor};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
pub struct TelemetryConfig {
    #[garde(dive)]
    #[serde(default)]
    pub sanitization: SanitizationConfig,

    #[garde(dive)]
    #[serde(default)]
    pub exporter: ExporterConfig,

    #[garde(dive)]
    #[serde(default)]
    pub logging: LoggingConfig,

    #[garde(skip)]
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SanitizationConfig {
    #[garde(skip)]
    #[serde(default = "default_true")]
    pub block_sensitive_endpoints: bool,

    #[garde(skip)]
    #[serde(default = "default_true")]
    pub redact_auth_endpoints: bool,

    /// Replace numeric and UUID path segments with `{id}` in derived span names
    #[garde(skip)]
    #[serde(default = "default_true")]
    pub template_route_ids: bool,

    /// Additional auth-related path suffixes, matched case-sensitively
    #[garde(inner(length(min = 2), pattern(r"^/")))]
    #[serde(default)]
    pub extra_auth_paths: Vec<String>,

    /// Applied after the built-in redaction rules
    #[garde(dive)]
    #[serde(default)]
    pub redaction_rules: Vec<RedactionRuleConfig>,
}

fn default_true() -> bool {
    true
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            block_sensitive_endpoints: true,
            redact_auth_endpoints: true,
            template_route_ids: true,
            extra_auth_paths: Vec::new(),
            redaction_rules: Vec::new(),
        }
    }
}

impl SanitizationConfig {
    pub fn build_redactor(&self) -> Result<Redactor> {
        let extra = self
            .redaction_rules
            .iter()
            .map(|rule| RedactionRule::new(&rule.name, &rule.pattern, &rule.replacement))
            .collect::<Result<Vec<_>>>()?;
        Ok(Redactor::with_rules(extra))
    }

    pub fn build_classifier(&self) -> Arc<EndpointClassifier> {
        Arc::new(EndpointClassifier::with_auth_paths(&self.extra_auth_paths))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Validate)]
pub struct RedactionRuleConfig {
    #[garde(length(min = 1))]
    pub name: String,

    #[garde(length(min = 1), custom(validate_regex))]
    pub pattern: String,

    #[garde(length(min = 1))]
    pub replacement: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ExporterConfig {
    #[garde(skip)]
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[garde(custom(validate_endpoint_url))]
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,

    #[garde(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    #[garde(length(min = 1))]
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[garde(range(min = 1, max = 300))]
    #[serde(default = "default_export_timeout")]
    pub export_timeout_secs: u64,
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

fn default_service_name() -> String {
    "finboard-web".to_string()
}

fn default_export_timeout() -> u64 {
    10
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: default_otlp_endpoint(),
            sample_rate: default_sample_rate(),
            service_name: default_service_name(),
            export_timeout_secs: default_export_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    #[garde(length(min = 1))]
    #[serde(default = "default_log_level")]
    pub level: String, // trace, debug, info, warn, error or an EnvFilter directive

    #[garde(pattern(r"^(json|pretty)$"))]
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    #[default]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

fn validate_regex(value: &str, _: &()) -> garde::Result {
    regex::Regex::new(value)
        .map(|_| ())
        .map_err(|err| garde::Error::new(format!("invalid pattern: {err}")))
}

fn validate_endpoint_url(value: &str, _: &()) -> garde::Result {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|_| garde::Error::new("Invalid endpoint URL"))
}
