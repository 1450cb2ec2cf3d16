//! OpenTelemetry provider wiring and trace context propagation

use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{self as sdktrace, Sampler, SpanProcessor, TracerProvider};
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::config::{ExporterConfig, TelemetryConfig};
use crate::error::Result;

/// Keeps the installed tracer provider alive; shut it down before exit so
/// batched spans are flushed
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl TelemetryGuard {
    pub(crate) fn new(provider: Option<TracerProvider>) -> Self {
        Self { provider }
    }

    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }

    /// Flush pending spans and uninstall the global provider
    pub fn shutdown(mut self) {
        self.shutdown_provider();
    }

    fn shutdown_provider(&mut self) {
        if let Some(provider) = self.provider.take() {
            for result in provider.force_flush() {
                if let Err(err) = result {
                    tracing::debug!(error = %err, "Span flush failed during shutdown");
                }
            }
            global::shutdown_tracer_provider();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        self.shutdown_provider();
    }
}

pub fn resource(config: &TelemetryConfig) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", config.exporter.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        KeyValue::new("environment", config.environment.as_str()),
        KeyValue::new("telemetry.sdk.name", "opentelemetry"),
        KeyValue::new("telemetry.sdk.language", "rust"),
    ])
}

/// OTLP/gRPC span exporter for the configured collector
pub fn build_span_exporter(config: &ExporterConfig) -> Result<opentelemetry_otlp::SpanExporter> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&config.otlp_endpoint)
        .with_timeout(Duration::from_secs(config.export_timeout_secs));

    Ok(opentelemetry_otlp::SpanExporterBuilder::from(exporter).build_span_exporter()?)
}

/// Provider whose only span processor is `processor`
pub fn build_tracer_provider<P>(config: &TelemetryConfig, processor: P) -> TracerProvider
where
    P: SpanProcessor + 'static,
{
    TracerProvider::builder()
        .with_span_processor(processor)
        .with_config(
            sdktrace::Config::default()
                .with_sampler(Sampler::TraceIdRatioBased(config.exporter.sample_rate))
                .with_resource(resource(config)),
        )
        .build()
}

/// Hex trace id of the current `tracing` span, if it belongs to a valid trace
pub fn current_trace_id() -> Option<String> {
    let context = tracing::Span::current().context();
    let span = context.span();
    let span_context = span.span_context();

    if span_context.is_valid() {
        Some(format!("{:032x}", span_context.trace_id()))
    } else {
        None
    }
}

struct HeaderExtractor<'a>(&'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

struct HeaderInjector<'a>(&'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = http::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(val) = http::HeaderValue::from_str(&value) {
                self.0.insert(name, val);
            }
        }
    }
}

/// Trace context carried by incoming request headers
pub fn extract_trace_context(headers: &http::HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Write `cx` into outgoing request headers
pub fn inject_context(cx: &Context, headers: &mut http::HeaderMap) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut HeaderInjector(headers))
    });
}

/// Write the current `tracing` span's context into outgoing request headers
pub fn inject_trace_context(headers: &mut http::HeaderMap) {
    inject_context(&tracing::Span::current().context(), headers);
}
