//! Telemetry initialization
//!
//! Installs logging and, when the exporter is enabled, a global tracer
//! provider whose only span processor is the sanitizing pipeline in front of
//! an OTLP batch exporter. Must be called from within a tokio runtime.

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{self as sdktrace, BatchSpanProcessor};
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::logging::{build_env_filter, fmt_layer, init_logging};
use super::tracing::{build_span_exporter, build_tracer_provider, TelemetryGuard};
use crate::config::{LoggingConfig, TelemetryConfig};
use crate::error::{Result, TelemetryError};
use crate::pipeline::SanitizingPipeline;
use crate::processors::GlobalAuditEmitter;
use crate::session::SessionContext;

pub const TRACER_NAME: &str = "finboard-telemetry";

/// Env filter, console output and span export through `tracer`
pub(crate) fn telemetry_subscriber(
    config: &LoggingConfig,
    tracer: sdktrace::Tracer,
) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(build_env_filter(config))
        .with(fmt_layer(config))
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
}

/// Initialize logging and span export in a single subscriber
pub fn init_telemetry(
    config: &TelemetryConfig,
    session: Option<Arc<SessionContext>>,
) -> Result<TelemetryGuard> {
    if !config.exporter.enabled {
        init_logging(&config.logging)?;
        tracing::info!("Span export is disabled");
        return Ok(TelemetryGuard::new(None));
    }

    let exporter = build_span_exporter(&config.exporter)?;
    let batch = BatchSpanProcessor::builder(exporter, runtime::Tokio).build();
    let pipeline = SanitizingPipeline::from_config(
        &config.sanitization,
        session,
        Arc::new(GlobalAuditEmitter),
        batch,
    )?;
    let stages = pipeline.stage_names();

    let provider = build_tracer_provider(config, pipeline);
    let tracer = provider.tracer(TRACER_NAME);

    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(provider.clone());

    telemetry_subscriber(&config.logging, tracer)
        .try_init()
        .map_err(|err| TelemetryError::Internal(anyhow::anyhow!("subscriber init failed: {err}")))?;

    tracing::info!(
        environment = config.environment.as_str(),
        otlp_endpoint = %config.exporter.otlp_endpoint,
        sample_rate = config.exporter.sample_rate,
        block_sensitive_endpoints = config.sanitization.block_sensitive_endpoints,
        redact_auth_endpoints = config.sanitization.redact_auth_endpoints,
        stages = ?stages,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard::new(Some(provider)))
}
