//! Span model (C2): tagged variants for every span kind, each owning an
//! append-only event list and lifecycle state, gated by a small
//! per-kind finite-state machine (§4.2).
//!
//! A span is identified by a unique id, belongs to one `source_id`
//! (the simulator that produced its events), and carries a
//! [`TraceContext`](crate::context::TraceContext) linking it to its trace and
//! parent. Mutation never crosses an `.await` point, so spans are guarded by
//! a plain [`std::sync::Mutex`] rather than an async one (§5 "Shared-resource
//! policy").

mod generic;
mod host_call;
mod host_dma;
mod host_int;
mod host_mmio;
mod host_msix;
mod host_pci;
mod net_device;
mod nic_dma;
mod nic_eth;
mod nic_mmio;
mod nic_msix;

pub use generic::GenericSpan;
pub use host_call::HostCallSpan;
pub use host_dma::HostDmaSpan;
pub use host_int::HostIntSpan;
pub use host_mmio::HostMmioSpan;
pub use host_msix::HostMsixSpan;
pub use host_pci::HostPciSpan;
pub use net_device::NetDeviceSpan;
pub use nic_dma::NicDmaSpan;
pub use nic_eth::NicEthSpan;
pub use nic_mmio::NicMmioSpan;
pub use nic_msix::NicMsixSpan;

use crate::context::{SpanId, TraceContext, TraceId};
use crate::event::{Event, ParserId, Timestamp};
use std::sync::{Arc, Mutex};

/// Tag identifying a span's kind, independent of its payload. Used for
/// logging and as an OpenTelemetry span-kind/name attribute (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    HostCall,
    HostMmio,
    HostDma,
    HostMsix,
    HostInt,
    HostPci,
    NicMmio,
    NicDma,
    NicEth,
    NicMsix,
    NetDevice,
    Generic,
}

impl SpanKind {
    pub fn name(&self) -> &'static str {
        match self {
            SpanKind::HostCall => "host_call",
            SpanKind::HostMmio => "host_mmio",
            SpanKind::HostDma => "host_dma",
            SpanKind::HostMsix => "host_msix",
            SpanKind::HostInt => "host_int",
            SpanKind::HostPci => "host_pci",
            SpanKind::NicMmio => "nic_mmio",
            SpanKind::NicDma => "nic_dma",
            SpanKind::NicEth => "nic_eth",
            SpanKind::NicMsix => "nic_msix",
            SpanKind::NetDevice => "net_device",
            SpanKind::Generic => "generic",
        }
    }
}

/// Fields every span variant shares, factored out so each kind-specific
/// struct embeds one instead of re-deriving id/event-list/lifecycle logic.
#[derive(Clone)]
pub struct SpanCore {
    id: SpanId,
    source_id: ParserId,
    kind: SpanKind,
    events: Vec<Event>,
    pending: bool,
    context: TraceContext,
}

impl SpanCore {
    fn new(id: SpanId, source_id: ParserId, kind: SpanKind, context: TraceContext) -> Self {
        Self { id, source_id, kind, events: Vec::new(), pending: true, context }
    }

    /// Whether `event` is even eligible to be offered to this span's
    /// kind-specific machine: the span must still be pending, and if it
    /// already has events, the new one must share the same `parser_id`
    /// (§3 Span invariant).
    fn admits(&self, event: &Event) -> bool {
        if !self.pending {
            return false;
        }
        match self.events.first() {
            Some(first) => first.parser_id == event.parser_id,
            None => true,
        }
    }

    fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    fn close(&mut self) {
        self.pending = false;
    }

    fn start_ts(&self) -> Option<Timestamp> {
        self.events.first().map(|e| e.timestamp)
    }

    fn end_ts(&self) -> Option<Timestamp> {
        if self.pending {
            return None;
        }
        self.events.last().map(|e| e.timestamp)
    }
}

/// Dispatches a method call to whichever concrete span struct a [`Span`]
/// variant wraps. Every variant stores `Arc<Mutex<Concrete>>` with a public
/// `core: SpanCore` field, so `$binding` below is always a `MutexGuard` over
/// a struct with a `.core` field.
macro_rules! dispatch_span {
    ($self:expr, |$binding:ident| $body:expr) => {
        match $self {
            Span::HostCall(s) => { let $binding = s.lock().unwrap(); $body }
            Span::HostMmio(s) => { let $binding = s.lock().unwrap(); $body }
            Span::HostDma(s) => { let $binding = s.lock().unwrap(); $body }
            Span::HostMsix(s) => { let $binding = s.lock().unwrap(); $body }
            Span::HostInt(s) => { let $binding = s.lock().unwrap(); $body }
            Span::HostPci(s) => { let $binding = s.lock().unwrap(); $body }
            Span::NicMmio(s) => { let $binding = s.lock().unwrap(); $body }
            Span::NicDma(s) => { let $binding = s.lock().unwrap(); $body }
            Span::NicEth(s) => { let $binding = s.lock().unwrap(); $body }
            Span::NicMsix(s) => { let $binding = s.lock().unwrap(); $body }
            Span::NetDevice(s) => { let $binding = s.lock().unwrap(); $body }
            Span::Generic(s) => { let $binding = s.lock().unwrap(); $body }
        }
    };
    (mut $self:expr, |$binding:ident| $body:expr) => {
        match $self {
            Span::HostCall(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::HostMmio(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::HostDma(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::HostMsix(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::HostInt(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::HostPci(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::NicMmio(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::NicDma(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::NicEth(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::NicMsix(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::NetDevice(s) => { let mut $binding = s.lock().unwrap(); $body }
            Span::Generic(s) => { let mut $binding = s.lock().unwrap(); $body }
        }
    };
}

/// A handle to one assembled span. Cheap to clone (an `Arc` per variant);
/// every spanner and the tracer hold shared handles rather than owning the
/// span outright (§3 "Ownership").
#[derive(Clone)]
pub enum Span {
    HostCall(Arc<Mutex<HostCallSpan>>),
    HostMmio(Arc<Mutex<HostMmioSpan>>),
    HostDma(Arc<Mutex<HostDmaSpan>>),
    HostMsix(Arc<Mutex<HostMsixSpan>>),
    HostInt(Arc<Mutex<HostIntSpan>>),
    HostPci(Arc<Mutex<HostPciSpan>>),
    NicMmio(Arc<Mutex<NicMmioSpan>>),
    NicDma(Arc<Mutex<NicDmaSpan>>),
    NicEth(Arc<Mutex<NicEthSpan>>),
    NicMsix(Arc<Mutex<NicMsixSpan>>),
    NetDevice(Arc<Mutex<NetDeviceSpan>>),
    Generic(Arc<Mutex<GenericSpan>>),
}

impl Span {
    pub fn id(&self) -> SpanId {
        dispatch_span!(self, |s| s.core.id)
    }

    pub fn source_id(&self) -> ParserId {
        dispatch_span!(self, |s| s.core.source_id)
    }

    pub fn kind(&self) -> SpanKind {
        dispatch_span!(self, |s| s.core.kind)
    }

    pub fn is_pending(&self) -> bool {
        dispatch_span!(self, |s| s.core.pending)
    }

    pub fn is_complete(&self) -> bool {
        !self.is_pending()
    }

    pub fn start_ts(&self) -> Option<Timestamp> {
        dispatch_span!(self, |s| s.core.start_ts())
    }

    pub fn end_ts(&self) -> Option<Timestamp> {
        dispatch_span!(self, |s| s.core.end_ts())
    }

    pub fn trace_id(&self) -> TraceId {
        dispatch_span!(self, |s| s.core.context.trace_id())
    }

    pub fn parent(&self) -> Option<Span> {
        dispatch_span!(self, |s| s.core.context.parent().cloned())
    }

    pub fn has_parent(&self) -> bool {
        dispatch_span!(self, |s| s.core.context.has_parent())
    }

    pub fn events(&self) -> Vec<Event> {
        dispatch_span!(self, |s| s.core.events.clone())
    }

    pub fn event_count(&self) -> usize {
        dispatch_span!(self, |s| s.core.events.len())
    }

    /// Freezes the span so no further events may be appended (§3 invariant:
    /// `pending == false` ⇒ timestamps frozen). Idempotent.
    pub fn mark_done(&self) {
        dispatch_span!(mut self, |s| s.core.close());
    }

    /// Re-parents this span's `TraceContext`, used by
    /// [`crate::tracer::Tracer::add_parent_lazily`] and when finishing a
    /// cloned receive-side call span against a newly arrived context.
    pub fn set_context(&self, trace_id: TraceId, parent: Span) {
        dispatch_span!(mut self, |s| s.core.context.set_parent(trace_id, parent));
    }

    pub fn set_trace_id(&self, trace_id: TraceId) {
        dispatch_span!(mut self, |s| s.core.context.set_trace_id(trace_id));
    }

    /// Offers `event` to this span's state machine. Returns `false` if the
    /// event is rejected — the caller (a [`crate::spanner`]) then starts a
    /// fresh span with the same event (§4.2).
    pub fn try_add(&self, event: Event, config: &crate::config::SpanningConfig) -> bool {
        match self {
            Span::HostCall(s) => s.lock().unwrap().try_add(event, config),
            Span::HostMmio(s) => s.lock().unwrap().try_add(event, config),
            Span::HostDma(s) => s.lock().unwrap().try_add(event),
            Span::HostMsix(s) => s.lock().unwrap().try_add(event),
            Span::HostInt(s) => s.lock().unwrap().try_add(event),
            Span::HostPci(s) => s.lock().unwrap().try_add(event),
            Span::NicMmio(s) => s.lock().unwrap().try_add(event),
            Span::NicDma(s) => s.lock().unwrap().try_add(event),
            Span::NicEth(s) => s.lock().unwrap().try_add(event),
            Span::NicMsix(s) => s.lock().unwrap().try_add(event),
            Span::NetDevice(s) => s.lock().unwrap().try_add(event),
            Span::Generic(s) => s.lock().unwrap().try_add(event),
        }
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("id", &self.id())
            .field("kind", &self.kind().name())
            .field("pending", &self.is_pending())
            .field("events", &self.event_count())
            .finish()
    }
}
