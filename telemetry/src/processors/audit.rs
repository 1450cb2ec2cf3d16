//! Privacy-safe record of a blocked credential exchange
//!
//! When a sensitive span is suppressed, a replacement span named
//! `sensitive-provider-endpoint` is emitted and ended immediately. It carries
//! only the HTTP method, the status code, the provider tag and a generic
//! endpoint key, never the URL, query string or any token.

use chrono::{DateTime, Utc};
use opentelemetry::global;
use opentelemetry::trace::{Span as _, SpanKind, Tracer};
use opentelemetry::{KeyValue, Value};
use serde::Serialize;
use std::fmt;
use tracing::info;

use super::keys;
use super::first_string_attribute;
use crate::sanitization::{EndpointKey, Provider};

pub const AUDIT_SPAN_NAME: &str = "sensitive-provider-endpoint";

/// Instrumentation scope of audit spans emitted through the global provider
pub const AUDIT_TRACER_NAME: &str = "finboard-telemetry.audit";

const KNOWN_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "CONNECT", "TRACE",
];

/// Map a raw method onto the fixed HTTP verb vocabulary
pub fn normalize_method(raw: &str) -> &'static str {
    KNOWN_METHODS
        .iter()
        .find(|method| method.eq_ignore_ascii_case(raw.trim()))
        .copied()
        .unwrap_or("OTHER")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub method: Option<&'static str>,
    pub status_code: Option<i64>,
    pub provider: Provider,
    pub endpoint: EndpointKey,
    pub observed_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(provider: Provider, endpoint: EndpointKey) -> Self {
        Self {
            method: None,
            status_code: None,
            provider,
            endpoint,
            observed_at: Utc::now(),
        }
    }

    /// Pull method and status code out of the blocked span's attributes
    pub fn from_attributes(
        attributes: &[KeyValue],
        provider: Provider,
        endpoint: EndpointKey,
    ) -> Self {
        let method =
            first_string_attribute(attributes, &[keys::HTTP_METHOD, keys::HTTP_REQUEST_METHOD])
                .map(normalize_method);

        let status_code = [keys::HTTP_STATUS_CODE, keys::HTTP_RESPONSE_STATUS_CODE]
            .iter()
            .find_map(|key| {
                attributes
                    .iter()
                    .find(|kv| kv.key.as_str() == *key)
                    .and_then(|kv| match &kv.value {
                        Value::I64(code) => Some(*code),
                        Value::String(code) => code.as_str().trim().parse().ok(),
                        _ => None,
                    })
            });

        Self {
            method,
            status_code,
            ..Self::new(provider, endpoint)
        }
    }

    /// The only attributes an audit span may carry
    pub fn attributes(&self) -> Vec<KeyValue> {
        let mut attributes = Vec::with_capacity(4);
        if let Some(method) = self.method {
            attributes.push(KeyValue::new(keys::HTTP_METHOD, method));
        }
        if let Some(status_code) = self.status_code {
            attributes.push(KeyValue::new(keys::HTTP_STATUS_CODE, status_code));
        }
        attributes.push(KeyValue::new(keys::AUDIT_PROVIDER, self.provider.as_str()));
        attributes.push(KeyValue::new(keys::AUDIT_ENDPOINT, self.endpoint.as_str()));
        attributes
    }
}

/// Sink for audit records of blocked spans
pub trait AuditEmitter: Send + Sync + fmt::Debug {
    fn emit(&self, record: &AuditRecord);
}

fn log_audit(record: &AuditRecord) {
    info!(
        target: "audit",
        audit_type = "sensitive_endpoint",
        provider = %record.provider,
        endpoint = %record.endpoint,
        method = record.method.unwrap_or("UNKNOWN"),
        status_code = ?record.status_code,
        "Sensitive provider endpoint called"
    );
}

fn emit_span<T: Tracer>(tracer: &T, record: &AuditRecord) {
    let mut span = tracer
        .span_builder(AUDIT_SPAN_NAME)
        .with_kind(SpanKind::Internal)
        .with_attributes(record.attributes())
        .start(tracer);
    span.end();
}

/// Emits audit spans with a fixed tracer
pub struct TracerAuditEmitter<T> {
    tracer: T,
}

impl<T> TracerAuditEmitter<T> {
    pub fn new(tracer: T) -> Self {
        Self { tracer }
    }
}

impl<T> fmt::Debug for TracerAuditEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerAuditEmitter").finish_non_exhaustive()
    }
}

impl<T> AuditEmitter for TracerAuditEmitter<T>
where
    T: Tracer + Send + Sync,
{
    fn emit(&self, record: &AuditRecord) {
        log_audit(record);
        emit_span(&self.tracer, record);
    }
}

/// Emits audit spans through whatever tracer provider is installed globally
/// at the time of the call
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalAuditEmitter;

impl AuditEmitter for GlobalAuditEmitter {
    fn emit(&self, record: &AuditRecord) {
        log_audit(record);
        emit_span(&global::tracer(AUDIT_TRACER_NAME), record);
    }
}
