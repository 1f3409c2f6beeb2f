//! Assembled trace model: a root span plus every span transitively
//! reachable from it through `parent` links, as handed to the exporter once
//! complete (§4.7).

use crate::context::TraceId;
use crate::span::Span;

/// A fully linked set of spans sharing one `trace_id`, rooted at the span
/// that started the trace. The exporter walks `spans` in the order spans
/// were marked done, which is always parent-before-child (§4.6 invariant).
#[derive(Debug, Clone)]
pub struct Trace {
    trace_id: TraceId,
    root: Span,
    spans: Vec<Span>,
}

impl Trace {
    pub fn new(root: Span) -> Self {
        Self { trace_id: root.trace_id(), root: root.clone(), spans: vec![root] }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn root(&self) -> &Span {
        &self.root
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn push(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpanningConfig;
    use crate::context::TraceContext;
    use crate::event::{Event, EventKind};
    use crate::span::{GenericSpan, Span};
    use std::sync::{Arc, Mutex};

    fn generic_span(id: u64, trace_id: TraceId) -> Span {
        let cfg = SpanningConfig::default();
        let concrete = GenericSpan::start(
            id,
            1,
            TraceContext::trace_starting(trace_id),
            Event::new(0, 1, "host", EventKind::HostInstr { pc: 0 }),
            &cfg,
        )
        .unwrap();
        Span::Generic(Arc::new(Mutex::new(concrete)))
    }

    #[test]
    fn new_trace_contains_only_the_root() {
        let root = generic_span(1, 7);
        let trace = Trace::new(root.clone());
        assert_eq!(trace.trace_id(), 7);
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.root().id(), root.id());
    }

    #[test]
    fn push_appends_children() {
        let root = generic_span(1, 7);
        let mut trace = Trace::new(root);
        trace.push(generic_span(2, 7));
        trace.push(generic_span(3, 7));
        assert_eq!(trace.len(), 3);
    }
}
