//! Span processors of the sanitizing pipeline
//!
//! Every processor here follows the same lifecycle as an SDK span processor
//! (`on_start`, `on_end`, `force_flush`, `shutdown`) but receives the
//! finished span mutably and answers with a [`SpanDecision`]. The
//! [`SanitizingPipeline`](crate::pipeline::SanitizingPipeline) runs them in
//! order over one span and honors the decision before any export-bound
//! processor sees it.
//!
//! [`FilteringSpanProcessor`] is the exception: it wraps a regular SDK
//! processor and is itself a regular SDK processor.

pub mod audit;
pub mod filtering;
pub mod redaction;
pub mod route;
pub mod sensitive;

pub use audit::{
    AuditEmitter, AuditRecord, GlobalAuditEmitter, TracerAuditEmitter, AUDIT_SPAN_NAME,
};
pub use filtering::FilteringSpanProcessor;
pub use redaction::AttributeRedactionProcessor;
pub use route::RouteNamingProcessor;
pub use sensitive::SensitiveEndpointProcessor;

use opentelemetry::trace::{Status, TraceResult};
use opentelemetry::{Context, KeyValue, Value};
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::trace::Span;
use std::borrow::Cow;
use std::fmt;

use crate::error::Result;
use crate::sanitization::Redactor;

/// Attribute keys read or written by the processors
pub mod keys {
    pub const HTTP_URL: &str = "http.url";
    pub const URL_FULL: &str = "url.full";
    pub const HTTP_TARGET: &str = "http.target";
    pub const HTTP_METHOD: &str = "http.method";
    pub const HTTP_REQUEST_METHOD: &str = "http.request.method";
    pub const HTTP_STATUS_CODE: &str = "http.status_code";
    pub const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";
    pub const HTTP_ROUTE: &str = "http.route";
    pub const SPAN_KIND: &str = "span.kind";
    pub const CORRELATION_HASH: &str = "session.correlation_hash";
    pub const AUDIT_PROVIDER: &str = "provider";
    pub const AUDIT_ENDPOINT: &str = "endpoint";
}

/// Outcome of one processor for one span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanDecision {
    /// Export the span as it now stands
    Export,
    /// Attributes were stripped; the span may still be exported
    Redact,
    /// Never export this span
    Suppress,
}

pub trait SanitizingProcessor: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    fn on_end(&self, span: &mut SpanData) -> Result<SpanDecision>;

    fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        Ok(())
    }
}

/// First non-empty string value among `keys`, in priority order
pub(crate) fn first_string_attribute<'a>(
    attributes: &'a [KeyValue],
    keys: &[&str],
) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        attributes
            .iter()
            .find(|kv| kv.key.as_str() == *key)
            .and_then(|kv| match &kv.value {
                Value::String(value) if !value.as_str().is_empty() => Some(value.as_str()),
                _ => None,
            })
    })
}

/// URL of the span: `http.url`, then `url.full`, then `http.target`
pub fn span_url(attributes: &[KeyValue]) -> Option<&str> {
    first_string_attribute(attributes, &[keys::HTTP_URL, keys::URL_FULL, keys::HTTP_TARGET])
}

/// Replace the value under `key`, appending the attribute if absent
pub(crate) fn upsert_attribute(attributes: &mut Vec<KeyValue>, attribute: KeyValue) {
    match attributes.iter_mut().find(|kv| kv.key == attribute.key) {
        Some(existing) => existing.value = attribute.value,
        None => attributes.push(attribute),
    }
}

/// Pattern-redact a span or event name, writing back only on change
pub(crate) fn redact_name(redactor: &Redactor, name: &mut Cow<'static, str>) {
    let redacted = match redactor.redact(name.as_ref()) {
        Cow::Owned(redacted) => Some(redacted),
        Cow::Borrowed(_) => None,
    };
    if let Some(redacted) = redacted {
        *name = Cow::Owned(redacted);
    }
}

/// Pattern-redact the description of an error status
pub(crate) fn redact_status(redactor: &Redactor, status: &mut Status) {
    if let Status::Error { description } = status {
        redact_name(redactor, description);
    }
}
