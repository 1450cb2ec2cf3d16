//! Logging and span export setup
//!
//! - Structured logging with `tracing-subscriber`
//! - OTLP span export behind the sanitizing pipeline
//! - W3C trace context propagation for outgoing requests

pub mod init;
pub mod logging;
pub mod tracing;

pub use init::{init_telemetry, TRACER_NAME};
pub use logging::{build_env_filter, fmt_layer, init_logging};
pub use tracing::{
    build_span_exporter, build_tracer_provider, current_trace_id, extract_trace_context,
    inject_context, inject_trace_context, resource, TelemetryGuard,
};
