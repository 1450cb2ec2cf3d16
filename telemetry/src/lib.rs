//! Span sanitization for the Finboard web telemetry pipeline
//!
//! Finished spans pass through a [`SanitizingPipeline`] before any exporter
//! sees them. The pipeline blocks credential-exchange spans outright
//! (emitting a minimal audit span instead), strips auth-related spans to a
//! small allow-list, redacts secrets from every remaining attribute, names
//! spans after their HTTP route and tags them with a per-session
//! correlation hash.

pub mod config;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod processors;
pub mod sanitization;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{load_config, SanitizationConfig, TelemetryConfig};
pub use error::{Result, TelemetryError};
pub use observability::{init_telemetry, inject_trace_context, TelemetryGuard};
pub use pipeline::{SanitizingPipeline, SanitizingPipelineBuilder};
pub use processors::{
    AttributeRedactionProcessor, AuditEmitter, AuditRecord, FilteringSpanProcessor,
    GlobalAuditEmitter, RouteNamingProcessor, SanitizingProcessor, SensitiveEndpointProcessor,
    SpanDecision, TracerAuditEmitter,
};
pub use sanitization::{is_auth_related, is_sensitive, redact, should_suppress_interaction};
pub use session::SessionContext;
