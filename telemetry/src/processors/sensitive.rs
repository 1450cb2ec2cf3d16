use opentelemetry::Value;
use opentelemetry_sdk::export::trace::SpanData;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

use super::audit::{AuditEmitter, AuditRecord, GlobalAuditEmitter};
use super::{keys, redact_name, redact_status, span_url, SanitizingProcessor, SpanDecision};
use crate::error::Result;
use crate::sanitization::attributes::{is_url_attribute_key, redact_url_with};
use crate::sanitization::{EndpointClass, EndpointClassifier, Redactor};

/// Attributes an auth-related span keeps after redaction
pub const AUTH_ALLOWED_ATTRIBUTES: &[&str] = &[
    keys::HTTP_METHOD,
    keys::HTTP_REQUEST_METHOD,
    keys::HTTP_STATUS_CODE,
    keys::HTTP_RESPONSE_STATUS_CODE,
    keys::HTTP_URL,
    keys::URL_FULL,
    keys::HTTP_TARGET,
    keys::SPAN_KIND,
];

/// Blocks spans for credential-exchange endpoints and strips auth-related
/// spans down to their allow-listed attributes.
///
/// A blocked span is replaced by an audit record handed to the
/// [`AuditEmitter`]; the span itself is answered with
/// [`SpanDecision::Suppress`] and loses all attributes.
#[derive(Debug, Clone)]
pub struct SensitiveEndpointProcessor {
    classifier: Arc<EndpointClassifier>,
    redactor: Arc<Redactor>,
    audit: Arc<dyn AuditEmitter>,
    block_sensitive_endpoints: bool,
    redact_auth_endpoints: bool,
}

impl Default for SensitiveEndpointProcessor {
    fn default() -> Self {
        Self::new(Arc::new(GlobalAuditEmitter))
    }
}

impl SensitiveEndpointProcessor {
    pub fn new(audit: Arc<dyn AuditEmitter>) -> Self {
        Self {
            classifier: Arc::new(EndpointClassifier::new()),
            redactor: Arc::new(Redactor::new()),
            audit,
            block_sensitive_endpoints: true,
            redact_auth_endpoints: true,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<EndpointClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_redactor(mut self, redactor: Arc<Redactor>) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn with_blocking(mut self, enabled: bool) -> Self {
        self.block_sensitive_endpoints = enabled;
        self
    }

    pub fn with_auth_redaction(mut self, enabled: bool) -> Self {
        self.redact_auth_endpoints = enabled;
        self
    }

    pub fn blocking_enabled(&self) -> bool {
        self.block_sensitive_endpoints
    }

    pub fn auth_redaction_enabled(&self) -> bool {
        self.redact_auth_endpoints
    }

    /// Whether `on_end` would suppress this span
    pub fn should_block(&self, span: &SpanData) -> bool {
        self.block_sensitive_endpoints
            && span_url(&span.attributes).is_some_and(|url| self.classifier.is_sensitive(url))
    }

    fn strip_to_allow_list(&self, span: &mut SpanData) {
        span.attributes
            .retain(|kv| AUTH_ALLOWED_ATTRIBUTES.contains(&kv.key.as_str()));

        for kv in span.attributes.iter_mut() {
            if !is_url_attribute_key(kv.key.as_str()) {
                continue;
            }
            let Value::String(current) = &kv.value else {
                continue;
            };
            let redacted = match redact_url_with(&self.redactor, current.as_str()) {
                Cow::Owned(redacted) => Some(redacted),
                Cow::Borrowed(_) => None,
            };
            if let Some(redacted) = redacted {
                kv.value = Value::from(redacted);
            }
        }

        // Event names and attributes are free-form, none of them is allow-listed
        span.events.events.clear();
        redact_name(&self.redactor, &mut span.name);
        redact_status(&self.redactor, &mut span.status);
    }
}

impl SanitizingProcessor for SensitiveEndpointProcessor {
    fn name(&self) -> &'static str {
        "sensitive-endpoint"
    }

    fn on_end(&self, span: &mut SpanData) -> Result<SpanDecision> {
        let Some(url) = span_url(&span.attributes) else {
            return Ok(SpanDecision::Export);
        };

        match self.classifier.classify(url) {
            Some(EndpointClass::Sensitive { provider, endpoint })
                if self.block_sensitive_endpoints =>
            {
                let record = AuditRecord::from_attributes(&span.attributes, provider, endpoint);
                span.attributes.clear();
                span.events.events.clear();
                self.audit.emit(&record);
                debug!(%provider, %endpoint, "Suppressed sensitive endpoint span");
                Ok(SpanDecision::Suppress)
            }
            // Sensitive spans fall through to redaction when blocking is off
            Some(_) if self.redact_auth_endpoints => {
                let before = span.attributes.len();
                self.strip_to_allow_list(span);
                debug!(removed = before - span.attributes.len(), "Redacted auth-related span");
                Ok(SpanDecision::Redact)
            }
            _ => Ok(SpanDecision::Export),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitization::{EndpointKey, Provider};
    use crate::testing::{finished_span, rendered, RecordingAuditEmitter};
    use opentelemetry::trace::{Event, Status};
    use opentelemetry::KeyValue;
    use std::time::SystemTime;

    fn processor(audit: &Arc<RecordingAuditEmitter>) -> SensitiveEndpointProcessor {
        SensitiveEndpointProcessor::new(audit.clone())
    }

    #[test]
    fn test_no_url_is_exported_untouched() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let mut span = finished_span("db.query", vec![KeyValue::new("db.system", "postgres")]);
        let before = span.attributes.clone();

        let decision = processor(&audit).on_end(&mut span).unwrap();

        assert_eq!(decision, SpanDecision::Export);
        assert_eq!(span.attributes, before);
        assert!(audit.records().is_empty());
    }

    #[test]
    fn test_sensitive_span_is_suppressed_and_audited() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let processor = processor(&audit);
        let mut span = finished_span(
            "HTTP POST",
            vec![
                KeyValue::new(
                    keys::HTTP_URL,
                    "https://api.finboard.io/api/plaid/exchange-token?public_token=public-sandbox-123",
                ),
                KeyValue::new(keys::HTTP_METHOD, "POST"),
                KeyValue::new(keys::HTTP_STATUS_CODE, 200_i64),
                KeyValue::new("request.body", "public-sandbox-123"),
            ],
        );

        assert!(processor.should_block(&span));
        let decision = processor.on_end(&mut span).unwrap();

        assert_eq!(decision, SpanDecision::Suppress);
        assert!(span.attributes.is_empty());

        let records = audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].provider, Provider::Plaid);
        assert_eq!(records[0].endpoint, EndpointKey::ExchangeToken);
        assert_eq!(
            rendered(&records[0].attributes()),
            vec![
                ("http.method".to_string(), "POST".to_string()),
                ("http.status_code".to_string(), "200".to_string()),
                ("provider".to_string(), "plaid".to_string()),
                ("endpoint".to_string(), "exchange-token".to_string()),
            ]
        );
    }

    #[test]
    fn test_url_priority_decides_classification() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let processor = processor(&audit);
        let span = finished_span(
            "HTTP POST",
            vec![
                KeyValue::new(keys::HTTP_TARGET, "/api/teller/enrollment"),
                KeyValue::new(keys::URL_FULL, "https://api.finboard.io/api/transactions"),
            ],
        );

        assert!(!processor.should_block(&span));
    }

    #[test]
    fn test_mismatched_case_is_not_blocked() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let span = finished_span(
            "HTTP POST",
            vec![KeyValue::new(keys::HTTP_URL, "https://api.finboard.io/api/PLAID/EXCHANGE-TOKEN")],
        );

        assert!(!processor(&audit).should_block(&span));
    }

    #[test]
    fn test_auth_span_keeps_only_allow_list() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let processor = processor(&audit).with_blocking(false);
        let mut span = finished_span(
            "HTTP POST",
            vec![
                KeyValue::new(keys::HTTP_URL, "https://api.finboard.io/api/auth/login"),
                KeyValue::new(keys::HTTP_METHOD, "POST"),
                KeyValue::new(keys::HTTP_STATUS_CODE, 200_i64),
                KeyValue::new("user.id", "123"),
            ],
        );

        let decision = processor.on_end(&mut span).unwrap();

        assert_eq!(decision, SpanDecision::Redact);
        assert_eq!(
            rendered(&span.attributes),
            vec![
                ("http.url".to_string(), "https://api.finboard.io/api/auth/login".to_string()),
                ("http.method".to_string(), "POST".to_string()),
                ("http.status_code".to_string(), "200".to_string()),
            ]
        );
        assert!(audit.records().is_empty());
    }

    #[test]
    fn test_auth_url_value_is_redacted() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let mut span = finished_span(
            "HTTP GET",
            vec![KeyValue::new(
                keys::HTTP_URL,
                "https://api.finboard.io/api/auth/refresh?refresh_token=r-abc&client=web",
            )],
        );

        processor(&audit).on_end(&mut span).unwrap();

        assert_eq!(
            span.attributes[0].value.as_str(),
            "https://api.finboard.io/api/auth/refresh?refresh_token=[REDACTED]&client=web"
        );
    }

    #[test]
    fn test_sensitive_span_redacted_when_blocking_disabled() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let processor = processor(&audit).with_blocking(false);
        let mut span = finished_span(
            "HTTP POST",
            vec![
                KeyValue::new(keys::HTTP_URL, "https://api.finboard.io/api/teller/exchange-token"),
                KeyValue::new("enrollment.id", "enr_123"),
            ],
        );

        assert!(!processor.should_block(&span));
        assert_eq!(processor.on_end(&mut span).unwrap(), SpanDecision::Redact);
        assert_eq!(span.attributes.len(), 1);
        assert!(audit.records().is_empty());
    }

    #[test]
    fn test_both_toggles_off_exports_everything() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let processor = processor(&audit).with_blocking(false).with_auth_redaction(false);
        let mut span = finished_span(
            "HTTP POST",
            vec![
                KeyValue::new(keys::HTTP_URL, "https://api.finboard.io/api/auth/login"),
                KeyValue::new("user.id", "123"),
            ],
        );

        assert_eq!(processor.on_end(&mut span).unwrap(), SpanDecision::Export);
        assert_eq!(span.attributes.len(), 2);
    }

    #[test]
    fn test_extra_auth_paths() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let processor = processor(&audit)
            .with_classifier(Arc::new(EndpointClassifier::with_auth_paths(["/api/mfa/verify"])));
        let mut span = finished_span(
            "HTTP POST",
            vec![
                KeyValue::new(keys::HTTP_TARGET, "/api/mfa/verify"),
                KeyValue::new("mfa.code", "123456"),
            ],
        );

        assert_eq!(processor.on_end(&mut span).unwrap(), SpanDecision::Redact);
        assert_eq!(
            rendered(&span.attributes),
            vec![("http.target".to_string(), "/api/mfa/verify".to_string())]
        );
    }

    #[test]
    fn test_auth_span_drops_events_and_redacts_status() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let mut span = finished_span(
            "HTTP POST",
            vec![KeyValue::new(keys::HTTP_URL, "https://api.finboard.io/api/auth/login")],
        );
        span.events.events.push(Event::new(
            "login attempt",
            SystemTime::now(),
            vec![
                KeyValue::new("user.id", "123"),
                KeyValue::new("session", "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.abcDEF123"),
                KeyValue::new("card", "4111111111111111"),
            ],
            0,
        ));
        span.status = Status::error("auth failed for Bearer sk_live_abcdef123456");

        let decision = processor(&audit).on_end(&mut span).unwrap();

        assert_eq!(decision, SpanDecision::Redact);
        assert!(span.events.events.is_empty());
        let Status::Error { description } = &span.status else {
            panic!("status kind changed: {:?}", span.status);
        };
        assert!(!description.contains("sk_live_abcdef123456"));
    }

    #[test]
    fn test_suppressed_span_keeps_no_events() {
        let audit = Arc::new(RecordingAuditEmitter::default());
        let mut span = finished_span(
            "HTTP POST",
            vec![KeyValue::new(keys::HTTP_URL, "https://api.finboard.io/api/plaid/exchange-token")],
        );
        span.events.events.push(Event::new(
            "exchange",
            SystemTime::now(),
            vec![KeyValue::new("public_token", "public-sandbox-123")],
            0,
        ));

        assert_eq!(processor(&audit).on_end(&mut span).unwrap(), SpanDecision::Suppress);
        assert!(span.events.events.is_empty());
    }
}
