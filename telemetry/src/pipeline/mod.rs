//! Ordered composition of sanitizing stages and export-bound processors
//!
//! The pipeline is the one span processor registered with the tracer
//! provider. For every finished span it runs its sanitizing stages in order
//! against a single mutable copy of the span, then hands the result to the
//! export-bound processors. A stage answering [`SpanDecision::Suppress`]
//! ends processing: later stages and every export-bound processor never see
//! that span.
//!
//! Stage errors never reach the SDK. They are logged and the stage is
//! treated as having exported the span.

use opentelemetry::trace::{TraceError, TraceResult};
use opentelemetry::Context;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::trace::{Span, SpanProcessor};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::SanitizationConfig;
use crate::error::Result;
use crate::processors::{
    AttributeRedactionProcessor, AuditEmitter, FilteringSpanProcessor, RouteNamingProcessor,
    SanitizingProcessor, SensitiveEndpointProcessor, SpanDecision,
};
use crate::session::SessionContext;

#[derive(Debug, Default)]
pub struct SanitizingPipeline {
    stages: Vec<Box<dyn SanitizingProcessor>>,
    exporters: Vec<Box<dyn SpanProcessor>>,
}

#[derive(Debug, Default)]
pub struct SanitizingPipelineBuilder {
    stages: Vec<Box<dyn SanitizingProcessor>>,
    exporters: Vec<Box<dyn SpanProcessor>>,
}

impl SanitizingPipelineBuilder {
    /// Append a sanitizing stage; stages run in insertion order
    pub fn with_stage<S: SanitizingProcessor + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append an export-bound processor
    pub fn with_exporter<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.exporters.push(Box::new(processor));
        self
    }

    pub fn build(self) -> SanitizingPipeline {
        SanitizingPipeline {
            stages: self.stages,
            exporters: self.exporters,
        }
    }
}

impl SanitizingPipeline {
    pub fn builder() -> SanitizingPipelineBuilder {
        SanitizingPipelineBuilder::default()
    }

    /// The standard chain: blocking, attribute redaction, route naming, then
    /// `exporter` behind a filter that drops anything the blocking stage
    /// would block.
    pub fn from_config<P>(
        config: &SanitizationConfig,
        session: Option<Arc<SessionContext>>,
        audit: Arc<dyn AuditEmitter>,
        exporter: P,
    ) -> Result<Self>
    where
        P: SpanProcessor + 'static,
    {
        let redactor = Arc::new(config.build_redactor()?);

        let blocker = SensitiveEndpointProcessor::new(audit)
            .with_classifier(config.build_classifier())
            .with_redactor(Arc::clone(&redactor))
            .with_blocking(config.block_sensitive_endpoints)
            .with_auth_redaction(config.redact_auth_endpoints);

        let mut route = RouteNamingProcessor::new().with_id_templating(config.template_route_ids);
        if let Some(session) = session {
            route = route.with_session(session);
        }

        let filter = {
            let blocker = blocker.clone();
            FilteringSpanProcessor::new(exporter, move |span: &SpanData| blocker.should_block(span))
        };

        Ok(Self::builder()
            .with_stage(blocker)
            .with_stage(AttributeRedactionProcessor::new(redactor))
            .with_stage(route)
            .with_exporter(filter)
            .build())
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage over `span` and combine their decisions.
    ///
    /// `Suppress` wins over `Redact`, which wins over `Export`.
    pub fn process(&self, span: &mut SpanData) -> SpanDecision {
        let mut decision = SpanDecision::Export;

        for stage in &self.stages {
            match stage.on_end(span) {
                Ok(SpanDecision::Suppress) => {
                    debug!(stage = stage.name(), "Span suppressed");
                    return SpanDecision::Suppress;
                }
                Ok(SpanDecision::Redact) => decision = SpanDecision::Redact,
                Ok(SpanDecision::Export) => {}
                Err(err) if err.is_fatal() => {
                    warn!(stage = stage.name(), error = %err, "Sanitizing stage failed");
                }
                Err(err) => {
                    debug!(stage = stage.name(), error = %err, "Sanitizing stage skipped");
                }
            }
        }

        decision
    }
}

impl SpanProcessor for SanitizingPipeline {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        for stage in &self.stages {
            stage.on_start(span, cx);
        }
        for exporter in &self.exporters {
            exporter.on_start(span, cx);
        }
    }

    fn on_end(&self, mut span: SpanData) {
        if self.process(&mut span) == SpanDecision::Suppress {
            return;
        }

        if let Some((last, rest)) = self.exporters.split_last() {
            for exporter in rest {
                exporter.on_end(span.clone());
            }
            last.on_end(span);
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        let mut errors = Vec::new();
        for stage in &self.stages {
            if let Err(err) = stage.force_flush() {
                errors.push(err.to_string());
            }
        }
        for exporter in &self.exporters {
            if let Err(err) = exporter.force_flush() {
                errors.push(err.to_string());
            }
        }
        combine(errors)
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        let mut errors = Vec::new();
        for stage in self.stages.iter_mut() {
            if let Err(err) = stage.shutdown() {
                errors.push(err.to_string());
            }
        }
        for exporter in self.exporters.iter_mut() {
            if let Err(err) = exporter.shutdown() {
                errors.push(err.to_string());
            }
        }
        combine(errors)
    }
}

fn combine(errors: Vec<String>) -> TraceResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TraceError::Other(errors.join("; ").into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use crate::processors::keys;
    use crate::testing::{finished_span, CapturingProcessor, RecordingAuditEmitter};
    use opentelemetry::KeyValue;
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct FailingStage;

    impl SanitizingProcessor for FailingStage {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn on_end(&self, _span: &mut SpanData) -> Result<SpanDecision> {
            Err(TelemetryError::Session("hash unavailable".to_string()))
        }
    }

    #[derive(Debug)]
    struct FixedStage(SpanDecision);

    impl SanitizingProcessor for FixedStage {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn on_end(&self, _span: &mut SpanData) -> Result<SpanDecision> {
            Ok(self.0)
        }
    }

    fn standard(
        capture: &CapturingProcessor,
        audit: &Arc<RecordingAuditEmitter>,
    ) -> SanitizingPipeline {
        SanitizingPipeline::from_config(
            &SanitizationConfig::default(),
            None,
            audit.clone(),
            capture.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_standard_stage_order() {
        let capture = CapturingProcessor::default();
        let audit = Arc::new(RecordingAuditEmitter::default());

        assert_eq!(
            standard(&capture, &audit).stage_names(),
            vec!["sensitive-endpoint", "attribute-redaction", "route-naming"]
        );
    }

    #[test]
    fn test_suppressed_span_never_reaches_exporter() {
        let capture = CapturingProcessor::default();
        let audit = Arc::new(RecordingAuditEmitter::default());
        let pipeline = standard(&capture, &audit);

        pipeline.on_end(finished_span(
            "HTTP POST",
            vec![
                KeyValue::new(keys::HTTP_URL, "https://api.finboard.io/api/plaid/exchange-token"),
                KeyValue::new(keys::HTTP_METHOD, "POST"),
            ],
        ));

        assert_eq!(capture.ended(), 0);
        assert_eq!(audit.records().len(), 1);
    }

    #[test]
    fn test_exported_span_is_sanitized_and_named() {
        let capture = CapturingProcessor::default();
        let audit = Arc::new(RecordingAuditEmitter::default());
        let pipeline = standard(&capture, &audit);

        pipeline.on_end(finished_span(
            "HTTP GET",
            vec![
                KeyValue::new(keys::HTTP_METHOD, "GET"),
                KeyValue::new(keys::HTTP_TARGET, "/api/accounts/42?token=abc"),
                KeyValue::new("http.request.header.authorization", "Bearer abc"),
            ],
        ));

        let spans = capture.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "GET /api/accounts/{id}");
        assert_eq!(
            spans[0].attributes,
            vec![
                KeyValue::new(keys::HTTP_METHOD, "GET"),
                KeyValue::new(keys::HTTP_TARGET, "/api/accounts/42?token=[REDACTED]"),
            ]
        );
    }

    #[test]
    fn test_decisions_combine() {
        let pipeline = SanitizingPipeline::builder()
            .with_stage(FixedStage(SpanDecision::Redact))
            .with_stage(FixedStage(SpanDecision::Export))
            .build();
        let mut span = finished_span("x", vec![]);
        assert_eq!(pipeline.process(&mut span), SpanDecision::Redact);

        let pipeline = SanitizingPipeline::builder()
            .with_stage(FixedStage(SpanDecision::Suppress))
            .with_stage(FailingStage)
            .build();
        assert_eq!(pipeline.process(&mut span), SpanDecision::Suppress);
    }

    #[traced_test]
    #[test]
    fn test_stage_errors_fail_open() {
        let capture = CapturingProcessor::default();
        let pipeline = SanitizingPipeline::builder()
            .with_stage(FailingStage)
            .with_exporter(capture.clone())
            .build();

        pipeline.on_end(finished_span("GET /api/transactions", vec![]));

        assert_eq!(capture.ended(), 1);
        assert!(logs_contain("Sanitizing stage skipped"));
    }

    #[test]
    fn test_every_exporter_receives_span() {
        let first = CapturingProcessor::default();
        let second = CapturingProcessor::default();
        let mut pipeline = SanitizingPipeline::builder()
            .with_exporter(first.clone())
            .with_exporter(second.clone())
            .build();

        pipeline.on_end(finished_span("GET /api/budgets", vec![]));
        pipeline.force_flush().unwrap();
        pipeline.shutdown().unwrap();

        for capture in [&first, &second] {
            assert_eq!(capture.ended(), 1);
            assert_eq!(capture.flushes(), 1);
            assert_eq!(capture.shutdowns(), 1);
        }
    }

    #[test]
    fn test_invalid_rule_fails_construction() {
        let config = SanitizationConfig {
            redaction_rules: vec![crate::config::RedactionRuleConfig {
                name: "broken".to_string(),
                pattern: "(unclosed".to_string(),
                replacement: "[X]".to_string(),
            }],
            ..SanitizationConfig::default()
        };
        let audit: Arc<dyn AuditEmitter> = Arc::new(RecordingAuditEmitter::default());

        let result =
            SanitizingPipeline::from_config(&config, None, audit, CapturingProcessor::default());

        assert!(matches!(result, Err(TelemetryError::InvalidPattern(_))));
    }
}
