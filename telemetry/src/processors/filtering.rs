use opentelemetry::trace::TraceResult;
use opentelemetry::Context;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::trace::{Span, SpanProcessor};
use std::fmt;
use tracing::debug;

type SkipPredicate = Box<dyn Fn(&SpanData) -> bool + Send + Sync>;

/// Wraps an SDK span processor and keeps selected spans away from it.
///
/// `on_end` is forwarded only when `skip` returns false for the span.
/// `on_start`, `force_flush` and `shutdown` are always forwarded.
pub struct FilteringSpanProcessor<P> {
    inner: P,
    skip: SkipPredicate,
}

impl<P: SpanProcessor> FilteringSpanProcessor<P> {
    pub fn new<F>(inner: P, skip: F) -> Self
    where
        F: Fn(&SpanData) -> bool + Send + Sync + 'static,
    {
        Self {
            inner,
            skip: Box::new(skip),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: fmt::Debug> fmt::Debug for FilteringSpanProcessor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteringSpanProcessor")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<P: SpanProcessor> SpanProcessor for FilteringSpanProcessor<P> {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        self.inner.on_start(span, cx);
    }

    fn on_end(&self, span: SpanData) {
        if (self.skip)(&span) {
            debug!(span = %span.name, "Span filtered before export");
            return;
        }
        self.inner.on_end(span);
    }

    fn force_flush(&self) -> TraceResult<()> {
        self.inner.force_flush()
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        self.inner.shutdown()
    }
}
