use opentelemetry::trace::TraceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid redaction pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("No session credential is set")]
    MissingCredential,

    #[error("Session error: {0}")]
    Session(String),

    #[error("Export error: {0}")]
    Export(#[from] TraceError),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl TelemetryError {
    /// Whether this error should abort the caller.
    ///
    /// Only construction-time failures are fatal. Everything raised while a
    /// span is being processed degrades observability and nothing else.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TelemetryError::Config(_) | TelemetryError::InvalidPattern(_))
    }
}

impl From<figment::Error> for TelemetryError {
    fn from(err: figment::Error) -> Self {
        TelemetryError::Config(err.to_string())
    }
}

impl From<garde::Report> for TelemetryError {
    fn from(report: garde::Report) -> Self {
        TelemetryError::Config(report.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
