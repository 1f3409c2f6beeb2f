//! The process-wide span registry and lazy parent-before-child exporter (C6,
//! §4.6).
//!
//! A span is submitted to the exporter the moment it is both complete
//! (`mark_span_as_done`) and its parent has *already* been exported — never
//! before. A span whose parent is still pending, or hasn't even registered a
//! parent yet (see [`Tracer::add_parent_lazily`], §4.6 scenario S6), waits in
//! `waiting_for_parent` until the parent clears. Export itself runs on a
//! background task so `mark_span_as_done` never blocks its caller on
//! exporter I/O.

use crate::context::{SpanId, TraceContext, TraceId};
use crate::export::SpanExporter;
use crate::span::Span;
use crate::trace::Trace;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

struct State {
    next_span_id: SpanId,
    next_trace_id: TraceId,
    already_exported_spans: HashSet<SpanId>,
    waiting_for_parent: HashMap<SpanId, Vec<Span>>,
    /// Every live trace, keyed by trace id, so a re-parent (`add_parent_lazily`)
    /// can move every span sharing a trace rather than only the one passed in.
    traces: HashMap<TraceId, Trace>,
}

impl State {
    fn new() -> Self {
        Self {
            next_span_id: 1,
            next_trace_id: 1,
            already_exported_spans: HashSet::new(),
            waiting_for_parent: HashMap::new(),
            traces: HashMap::new(),
        }
    }
}

pub struct Tracer {
    state: Mutex<State>,
    exporter: Arc<dyn SpanExporter>,
}

impl Tracer {
    pub fn new(exporter: Arc<dyn SpanExporter>) -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(State::new()), exporter })
    }

    /// Mints a fresh span id. Exposed crate-wide so spanners can fork a
    /// span (e.g. `HostSpanner`'s receive-side call fan-out) without
    /// routing the new id through `start_span`.
    pub(crate) fn next_span_id(&self) -> SpanId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_span_id;
        state.next_span_id += 1;
        id
    }

    pub(crate) fn next_trace_id(&self) -> TraceId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_trace_id;
        state.next_trace_id += 1;
        id
    }

    /// Builds and registers a new span starting its own trace (§4.6
    /// `StartSpan<S>`). `build` constructs the kind-specific state machine
    /// from the starting event; `wrap` lifts the resulting `Arc<Mutex<T>>`
    /// into the [`Span`] enum. Returns `None` if `build` rejects the
    /// starting event.
    pub fn start_span<T>(
        &self,
        source_id: crate::event::ParserId,
        starting_event: crate::event::Event,
        config: &crate::config::SpanningConfig,
        build: impl FnOnce(
            SpanId,
            crate::event::ParserId,
            TraceContext,
            crate::event::Event,
            &crate::config::SpanningConfig,
        ) -> Option<T>,
        wrap: fn(Arc<Mutex<T>>) -> Span,
    ) -> Option<Span> {
        let id = self.next_span_id();
        let trace_id = self.next_trace_id();
        let context = TraceContext::trace_starting(trace_id);
        let concrete = build(id, source_id, context, starting_event, config)?;
        let span = wrap(Arc::new(Mutex::new(concrete)));
        self.state.lock().unwrap().traces.insert(trace_id, Trace::new(span.clone()));
        Some(span)
    }

    /// Builds a span as a direct child of `parent`, sharing its trace id
    /// (§4.6 `StartSpanByParent<S>`).
    pub fn start_span_by_parent<T>(
        &self,
        source_id: crate::event::ParserId,
        starting_event: crate::event::Event,
        config: &crate::config::SpanningConfig,
        parent: &Span,
        build: impl FnOnce(
            SpanId,
            crate::event::ParserId,
            TraceContext,
            crate::event::Event,
            &crate::config::SpanningConfig,
        ) -> Option<T>,
        wrap: fn(Arc<Mutex<T>>) -> Span,
    ) -> Option<Span> {
        let id = self.next_span_id();
        let trace_id = parent.trace_id();
        let context = TraceContext::child_of(trace_id, parent.clone());
        let concrete = build(id, source_id, context, starting_event, config)?;
        let span = wrap(Arc::new(Mutex::new(concrete)));
        self.state
            .lock()
            .unwrap()
            .traces
            .entry(trace_id)
            .or_insert_with(|| Trace::new(parent.clone()))
            .push(span.clone());
        Some(span)
    }

    /// Builds a span as a child of the span carried by `context` (§4.6
    /// `StartSpanByParentPassOnContext<S>`, §6 context-queue hand-off).
    pub fn start_span_by_parent_pass_on_context<T>(
        &self,
        source_id: crate::event::ParserId,
        starting_event: crate::event::Event,
        config: &crate::config::SpanningConfig,
        context: &crate::context::Context,
        build: impl FnOnce(
            SpanId,
            crate::event::ParserId,
            TraceContext,
            crate::event::Event,
            &crate::config::SpanningConfig,
        ) -> Option<T>,
        wrap: fn(Arc<Mutex<T>>) -> Span,
    ) -> Option<Span> {
        self.start_span_by_parent(source_id, starting_event, config, context.producing_span(), build, wrap)
    }

    /// Gives a span that was built outside the usual `start_span*` calls
    /// (e.g. `HostSpanner`'s receive-side call fork) its own fresh trace and
    /// registers it, so a later [`Tracer::add_parent_lazily`] on it only
    /// moves that span rather than whatever trace it happened to inherit.
    pub(crate) fn start_new_trace_for(&self, span: &Span) {
        let trace_id = self.next_trace_id();
        span.set_trace_id(trace_id);
        self.state.lock().unwrap().traces.insert(trace_id, Trace::new(span.clone()));
    }

    /// Re-parents a span discovered to belong under `parent` only after it
    /// was already created without one (§4.6 scenario S6: a receive-side
    /// span correlated to its sender after the fact). Every other span still
    /// sharing `span`'s current trace moves to `trace_id` too, and the old
    /// trace is dropped from the registry — the old trace id must not remain
    /// on any live span. If `span` has already been marked done, this
    /// re-evaluates whether it can now be exported.
    pub fn add_parent_lazily(&self, span: &Span, trace_id: TraceId, parent: Span) {
        let old_trace_id = span.trace_id();
        let new_root = parent.clone();
        span.set_context(trace_id, parent);

        if old_trace_id != trace_id {
            let mut state = self.state.lock().unwrap();
            if let Some(old_trace) = state.traces.remove(&old_trace_id) {
                let target = state.traces.entry(trace_id).or_insert_with(|| Trace::new(new_root));
                for sibling in old_trace.spans() {
                    if sibling.id() != span.id() {
                        sibling.set_trace_id(trace_id);
                    }
                    target.push(sibling.clone());
                }
            }
        }

        if span.is_complete() {
            self.try_export_or_queue(span.clone());
        }
    }

    /// Marks `span` as no longer accepting events and, once its parent chain
    /// is satisfied, hands it to the exporter (§4.6).
    pub fn mark_span_as_done(&self, span: Span) {
        span.mark_done();
        self.try_export_or_queue(span);
    }

    fn try_export_or_queue(&self, span: Span) {
        let mut ready = vec![span];
        // Spans freed by exporting their parent may themselves free further
        // children, so this drains breadth-first instead of recursing.
        while let Some(next) = ready.pop() {
            let mut state = self.state.lock().unwrap();
            if state.already_exported_spans.contains(&next.id()) {
                continue;
            }
            let parent_id = next.parent().map(|p| p.id());
            let parent_ready = match parent_id {
                None => true,
                Some(pid) => state.already_exported_spans.contains(&pid),
            };
            if !parent_ready {
                state.waiting_for_parent.entry(parent_id.unwrap()).or_default().push(next);
                continue;
            }
            state.already_exported_spans.insert(next.id());
            let freed = state.waiting_for_parent.remove(&next.id()).unwrap_or_default();
            drop(state);
            ready.extend(freed);
            self.submit(next);
        }
    }

    fn submit(&self, span: Span) {
        let exporter = self.exporter.clone();
        let span_id = span.id();
        tokio::spawn(async move {
            if let Err(err) = exporter.export(span).await {
                error!(span_id, error = %err, "span export failed");
            }
        });
    }

    /// Number of spans still waiting on a parent that hasn't exported yet.
    /// Exposed for diagnostics and tests; a nonzero value at shutdown means a
    /// trace never fully resolved (§7 "Missing parent at shutdown").
    pub fn pending_on_parent_count(&self) -> usize {
        self.state.lock().unwrap().waiting_for_parent.values().map(Vec::len).sum()
    }

    /// Logs every span still blocked waiting on a parent export. Called at
    /// pipeline shutdown so stuck traces are visible instead of silently
    /// dropped.
    pub fn log_unresolved(&self) {
        let state = self.state.lock().unwrap();
        for (parent_id, spans) in state.waiting_for_parent.iter() {
            for span in spans {
                warn!(
                    span_id = span.id(),
                    parent_id,
                    "span never exported: parent was never marked done"
                );
            }
        }
    }
}
