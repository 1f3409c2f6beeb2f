//! TraceContext (C3) and context-queue hand-off tokens (C5).

use crate::event::Timestamp;
use crate::span::Span;

pub type TraceId = u64;
pub type SpanId = u64;

/// Links a span to its parent span and the trace it belongs to.
///
/// Created either as trace-starting (`parent` is `None`) or as a child
/// (`parent` is required). Once a span has been assigned a `TraceContext` it
/// is immutable except through [`crate::tracer::Tracer::add_parent_lazily`],
/// which re-parents it.
#[derive(Clone)]
pub struct TraceContext {
    trace_id: TraceId,
    parent: Option<Span>,
}

impl TraceContext {
    pub fn trace_starting(trace_id: TraceId) -> Self {
        Self { trace_id, parent: None }
    }

    pub fn child_of(trace_id: TraceId, parent: Span) -> Self {
        Self { trace_id, parent: Some(parent) }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn parent(&self) -> Option<&Span> {
        self.parent.as_ref()
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent.as_ref().map(|p| p.id())
    }

    pub fn parent_start_ts(&self) -> Option<Timestamp> {
        self.parent.as_ref().and_then(|p| p.start_ts())
    }

    /// Re-parents this context in place, as used by
    /// `Tracer::add_parent_lazily`.
    pub fn set_parent(&mut self, trace_id: TraceId, parent: Span) {
        self.trace_id = trace_id;
        self.parent = Some(parent);
    }

    pub fn set_trace_id(&mut self, trace_id: TraceId) {
        self.trace_id = trace_id;
    }
}

/// What kind of causal hand-off a [`Context`] represents. Consumers reject a
/// context whose expectation doesn't match what they popped it for (§7
/// "Missing expected context").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expectation {
    Mmio,
    Dma,
    Msix,
    Tx,
    Rx,
}

impl std::fmt::Display for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Expectation::Mmio => "mmio",
            Expectation::Dma => "dma",
            Expectation::Msix => "msix",
            Expectation::Tx => "tx",
            Expectation::Rx => "rx",
        };
        write!(f, "{s}")
    }
}

/// The ephemeral hand-off token carried on a context queue (C5): "here is
/// the span that caused whatever you're about to observe".
#[derive(Clone)]
pub struct Context {
    expectation: Expectation,
    producing_span: Span,
}

impl Context {
    pub fn new(expectation: Expectation, producing_span: Span) -> Self {
        Self { expectation, producing_span }
    }

    pub fn expectation(&self) -> Expectation {
        self.expectation
    }

    pub fn producing_span(&self) -> &Span {
        &self.producing_span
    }

    pub fn is_expectation(&self, expectation: Expectation) -> bool {
        self.expectation == expectation
    }

    pub fn parent_start_ts(&self) -> Option<Timestamp> {
        self.producing_span.start_ts()
    }
}
