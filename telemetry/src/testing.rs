//! Test doubles shared by the unit tests

use opentelemetry::trace::{Span as _, TraceResult, Tracer, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::trace::{Span, SpanProcessor, TracerProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::processors::{AuditEmitter, AuditRecord};

/// SDK processor recording every call it receives
#[derive(Debug, Clone, Default)]
pub struct CapturingProcessor {
    spans: Arc<Mutex<Vec<SpanData>>>,
    started: Arc<AtomicUsize>,
    flushes: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

impl CapturingProcessor {
    pub fn spans(&self) -> Vec<SpanData> {
        self.spans.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn ended(&self) -> usize {
        self.spans.lock().unwrap().len()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl SpanProcessor for CapturingProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_end(&self, span: SpanData) {
        self.spans.lock().unwrap().push(span);
    }

    fn force_flush(&self) -> TraceResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingAuditEmitter {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditEmitter {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditEmitter for RecordingAuditEmitter {
    fn emit(&self, record: &AuditRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// A finished span produced by a real SDK tracer
pub fn finished_span(name: &'static str, attributes: Vec<KeyValue>) -> SpanData {
    let capture = CapturingProcessor::default();
    let provider = TracerProvider::builder()
        .with_span_processor(capture.clone())
        .build();

    let tracer = provider.tracer("finboard-telemetry-test");
    let mut span = tracer.span_builder(name).with_attributes(attributes).start(&tracer);
    span.end();

    capture.spans().pop().expect("ended span is captured")
}

/// Attributes as (key, string value) pairs
pub fn rendered(attributes: &[KeyValue]) -> Vec<(String, String)> {
    attributes
        .iter()
        .map(|kv| (kv.key.as_str().to_string(), kv.value.as_str().into_owned()))
        .collect()
}
