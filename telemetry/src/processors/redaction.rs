use opentelemetry_sdk::export::trace::SpanData;
use std::sync::Arc;

use super::{redact_name, redact_status, SanitizingProcessor, SpanDecision};
use crate::error::Result;
use crate::sanitization::{AttributeSanitizer, Redactor};

/// Runs the attribute sanitizer over every span and its events, and
/// pattern-redacts event names and the error status description.
///
/// Finished spans no longer hold the originating request, so header-echo
/// scrubbing is not available here; sensitive header attributes are still
/// removed by key.
#[derive(Debug, Clone, Default)]
pub struct AttributeRedactionProcessor {
    sanitizer: AttributeSanitizer,
}

impl AttributeRedactionProcessor {
    pub fn new(redactor: Arc<Redactor>) -> Self {
        Self {
            sanitizer: AttributeSanitizer::new(redactor),
        }
    }
}

impl SanitizingProcessor for AttributeRedactionProcessor {
    fn name(&self) -> &'static str {
        "attribute-redaction"
    }

    fn on_end(&self, span: &mut SpanData) -> Result<SpanDecision> {
        self.sanitizer.sanitize(&mut span.attributes, None, None);

        let redactor = self.sanitizer.redactor();
        for event in span.events.events.iter_mut() {
            self.sanitizer.sanitize(&mut event.attributes, None, None);
            redact_name(redactor, &mut event.name);
        }
        redact_status(redactor, &mut span.status);

        Ok(SpanDecision::Export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::keys;
    use crate::sanitization::RedactionRule;
    use crate::testing::{finished_span, rendered};
    use opentelemetry::trace::{Event, Status};
    use opentelemetry::KeyValue;
    use std::time::SystemTime;

    #[test]
    fn test_redacts_every_span() {
        let processor = AttributeRedactionProcessor::default();
        let mut span = finished_span(
            "GET /api/accounts",
            vec![
                KeyValue::new(
                    keys::HTTP_TARGET,
                    "/api/accounts?access_token=access-sandbox-1&limit=5",
                ),
                KeyValue::new("http.request.header.cookie", "sid=abc"),
                KeyValue::new("app.error", "declined card 4111 1111 1111 1111"),
                KeyValue::new(keys::HTTP_STATUS_CODE, 402_i64),
            ],
        );

        let decision = processor.on_end(&mut span).unwrap();

        assert_eq!(decision, SpanDecision::Export);
        assert_eq!(
            rendered(&span.attributes),
            vec![
                (
                    "http.target".to_string(),
                    "/api/accounts?access_token=[REDACTED]&limit=5".to_string()
                ),
                ("app.error".to_string(), "declined card [REDACTED_CARD]".to_string()),
                ("http.status_code".to_string(), "402".to_string()),
            ]
        );
    }

    #[test]
    fn test_redacts_events_and_status() {
        let processor = AttributeRedactionProcessor::default();
        let mut span = finished_span("GET /api/accounts", vec![]);
        span.events.events.push(Event::new(
            "retrying with Bearer sk_live_abcdef123456",
            SystemTime::now(),
            vec![
                KeyValue::new("user.id", "123"),
                KeyValue::new("card", "4111111111111111"),
                KeyValue::new("http.request.header.authorization", "Bearer abc"),
            ],
            0,
        ));
        span.status = Status::error("upstream rejected Bearer sk_live_abcdef123456");

        processor.on_end(&mut span).unwrap();

        let event = &span.events.events[0];
        assert_eq!(event.name, "retrying with Bearer [REDACTED]");
        assert_eq!(
            rendered(&event.attributes),
            vec![
                ("user.id".to_string(), "123".to_string()),
                ("card".to_string(), "[REDACTED_CARD]".to_string()),
            ]
        );
        assert_eq!(span.status, Status::error("upstream rejected Bearer [REDACTED]"));
    }

    #[test]
    fn test_custom_rules_apply() {
        let rule =
            RedactionRule::new("account_number", r"\bacct-\d{6,}\b", "[REDACTED_ACCOUNT]").unwrap();
        let processor =
            AttributeRedactionProcessor::new(Arc::new(Redactor::with_rules(vec![rule])));
        let mut span = finished_span("sync", vec![KeyValue::new("app.account", "acct-00012345")]);

        processor.on_end(&mut span).unwrap();

        assert_eq!(span.attributes[0].value.as_str(), "[REDACTED_ACCOUNT]");
    }
}
