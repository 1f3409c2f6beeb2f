use crate::channel::BoundedChannel;
use crate::config::SpanningConfig;
use crate::context::{Context, Expectation};
use crate::event::{Event, EventKind, ParserId};
use crate::queues::{pop_expecting, ContextQueues};
use crate::span::{HostCallSpan, HostDmaSpan, HostIntSpan, HostMmioSpan, HostPciSpan, Span};
use crate::tracer::Tracer;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Consumes the host-CPU event stream (§4.3). Holds one pending span each
/// for the current syscall call, interrupt, and PCI config access, plus
/// lists for MMIOs and DMAs that may be interleaved.
pub struct HostSpanner {
    source_id: ParserId,
    tracer: Arc<Tracer>,
    config: Arc<SpanningConfig>,
    queues: ContextQueues,

    call: Option<Span>,
    interrupt: Option<Span>,
    msix: Option<Span>,
    pci: Option<Span>,
    mmios: Vec<Span>,
    dmas: Vec<Span>,
    /// One-shot: suppresses the next to-device MMIO write's expectation
    /// push when a PCI configuration write just completed (§4.3 "MMIO").
    pci_write_just_completed: bool,
}

impl HostSpanner {
    pub fn new(
        source_id: ParserId,
        tracer: Arc<Tracer>,
        config: Arc<SpanningConfig>,
        queues: ContextQueues,
    ) -> Self {
        Self {
            source_id,
            tracer,
            config,
            queues,
            call: None,
            interrupt: None,
            msix: None,
            pci: None,
            mmios: Vec::new(),
            dmas: Vec::new(),
            pci_write_just_completed: false,
        }
    }

    pub async fn run(mut self, input: Arc<BoundedChannel<Event>>) {
        while let Some(event) = input.pop().await {
            self.handle_event(event).await;
        }
        self.finalize().await;
    }

    async fn handle_event(&mut self, event: Event) {
        match &event.kind {
            EventKind::HostCall { .. } => self.handle_call(event).await,
            EventKind::HostMmioR { .. }
            | EventKind::HostMmioW { .. }
            | EventKind::HostMmioCR { .. }
            | EventKind::HostMmioCW { .. }
            | EventKind::HostMmioImRespPoW => self.handle_mmio(event).await,
            EventKind::HostPciRW { .. } | EventKind::HostConf { .. } => self.handle_pci(event).await,
            EventKind::HostDmaR { .. } | EventKind::HostDmaW { .. } | EventKind::HostDmaC { .. } => {
                self.handle_dma(event).await
            }
            EventKind::HostMsiX { .. } => self.handle_msix_start(event).await,
            EventKind::HostPostInt | EventKind::HostClearInt => self.handle_interrupt(event).await,
            EventKind::HostInstr { .. } => {}
            other => warn!(kind = other.name(), "host spanner: unhandled event kind"),
        }
    }

    async fn handle_call(&mut self, event: Event) {
        if let Some(current) = self.call.clone() {
            if current.try_add(event.clone(), &self.config) {
                return;
            }
            // `HostCallSpan::try_add` already closed `current` on a new
            // entry symbol; finish it and start fresh with this event.
            self.finish_call(current).await;
        }
        if let Some(span) =
            self.tracer.start_span(self.source_id, event, &self.config, HostCallSpan::start, Span::HostCall)
        {
            self.call = Some(span);
        }
    }

    /// Resolves the outgoing call span's parent (if it's on the receive
    /// path) and hands it to the tracer, fanning out clones for any extra
    /// ready `Context{Rx}` tokens the network produced ahead of this call
    /// (§4.3 "Call", scenario S4).
    async fn finish_call(&mut self, call: Span) {
        let kernel_rx = match &call {
            Span::HostCall(s) => s.lock().unwrap().kernel_rx(),
            _ => false,
        };

        if kernel_rx {
            if let Some(ctx) = pop_expecting(&self.queues.network_to_host, Expectation::Rx).await {
                let parent = ctx.producing_span().clone();
                self.tracer.add_parent_lazily(&call, parent.trace_id(), parent);

                let call_start = call.start_ts().unwrap_or(u64::MAX);
                while let Some(extra) = self.queues.network_to_host.try_pop_if(|c| {
                    c.is_expectation(Expectation::Rx)
                        && c.parent_start_ts().is_some_and(|ts| ts < call_start)
                }) {
                    let clone = Self::fork_call(&self.tracer, &call);
                    // The fork inherits `call`'s current trace id; give it a trace
                    // of its own first so re-parenting it doesn't drag `call` and
                    // its already-settled children along.
                    self.tracer.start_new_trace_for(&clone);
                    let parent = extra.producing_span().clone();
                    self.tracer.add_parent_lazily(&clone, parent.trace_id(), parent);
                    self.tracer.mark_span_as_done(clone);
                }
            }
        }

        self.tracer.mark_span_as_done(call);
    }

    fn fork_call(tracer: &Tracer, call: &Span) -> Span {
        match call {
            Span::HostCall(inner) => {
                let forked = inner.lock().unwrap().fork(tracer.next_span_id());
                Span::HostCall(Arc::new(Mutex::new(forked)))
            }
            other => other.clone(),
        }
    }

    async fn handle_mmio(&mut self, event: Event) {
        for span in self.mmios.iter() {
            if span.try_add(event.clone(), &self.config) {
                if span.is_complete() {
                    self.tracer.mark_span_as_done(span.clone());
                }
                self.mmios.retain(|s| !s.is_complete());
                return;
            }
        }

        let Some(call) = self.call.clone() else {
            warn!("mmio event with no enclosing call span; dropping");
            return;
        };

        let Some(span) = self.tracer.start_span_by_parent(
            self.source_id,
            event,
            &self.config,
            &call,
            HostMmioSpan::start,
            Span::HostMmio,
        ) else {
            return;
        };

        let (bar, is_write) = match &span {
            Span::HostMmio(inner) => {
                let guard = inner.lock().unwrap();
                (guard.bar(), !guard.is_read())
            }
            _ => unreachable!(),
        };

        if self.config.is_to_device_bar(bar) && is_write {
            if self.pci_write_just_completed {
                self.pci_write_just_completed = false;
            } else {
                let _ = self.queues.host_to_nic.push(Context::new(Expectation::Mmio, span.clone())).await;
            }
        }

        if span.is_complete() {
            self.tracer.mark_span_as_done(span);
        } else {
            self.mmios.push(span);
        }
    }

    async fn handle_pci(&mut self, event: Event) {
        match &event.kind {
            EventKind::HostPciRW { .. } => {
                let Some(call) = self.call.clone() else {
                    warn!("pci event with no enclosing call span; dropping");
                    return;
                };
                self.pci = self.tracer.start_span_by_parent(
                    self.source_id,
                    event,
                    &self.config,
                    &call,
                    HostPciSpan::start,
                    Span::HostPci,
                );
            }
            EventKind::HostConf { .. } => {
                let Some(span) = self.pci.take() else {
                    warn!("pci config completion with no pending pci span; dropping");
                    return;
                };
                if span.try_add(event, &self.config) {
                    self.tracer.mark_span_as_done(span);
                    self.pci_write_just_completed = true;
                } else {
                    warn!("pci config completion rejected by pending span; dropping");
                }
            }
            _ => {}
        }
    }

    async fn handle_dma(&mut self, event: Event) {
        if let Some(msix) = self.msix.clone() {
            if msix.try_add(event.clone(), &self.config) {
                if msix.is_complete() {
                    self.tracer.mark_span_as_done(msix);
                    self.msix = None;
                }
                return;
            }
        }

        for span in self.dmas.iter() {
            if span.try_add(event.clone(), &self.config) {
                if span.is_complete() {
                    self.tracer.mark_span_as_done(span.clone());
                }
                self.dmas.retain(|s| !s.is_complete());
                return;
            }
        }

        match &event.kind {
            EventKind::HostDmaR { .. } | EventKind::HostDmaW { .. } => {
                let Some(ctx) = pop_expecting(&self.queues.nic_to_host, Expectation::Dma).await else {
                    return;
                };
                if let Some(span) = self.tracer.start_span_by_parent_pass_on_context(
                    self.source_id,
                    event,
                    &self.config,
                    &ctx,
                    HostDmaSpan::start,
                    Span::HostDma,
                ) {
                    self.dmas.push(span);
                }
            }
            _ => warn!("dma completion with no pending dma or msix span; dropping"),
        }
    }

    async fn handle_msix_start(&mut self, event: Event) {
        let Some(ctx) = pop_expecting(&self.queues.nic_to_host, Expectation::Msix).await else {
            return;
        };
        self.msix = self.tracer.start_span_by_parent_pass_on_context(
            self.source_id,
            event,
            &self.config,
            &ctx,
            crate::span::HostMsixSpan::start,
            Span::HostMsix,
        );
    }

    async fn handle_interrupt(&mut self, event: Event) {
        match &event.kind {
            EventKind::HostPostInt => {
                let Some(call) = self.call.clone() else {
                    warn!("post-int with no enclosing call span; dropping");
                    return;
                };
                self.interrupt = self.tracer.start_span_by_parent(
                    self.source_id,
                    event,
                    &self.config,
                    &call,
                    HostIntSpan::start,
                    Span::HostInt,
                );
            }
            EventKind::HostClearInt => {
                let Some(span) = self.interrupt.take() else {
                    warn!("clear-int with no pending post-int span; dropping");
                    return;
                };
                if span.try_add(event, &self.config) {
                    self.tracer.mark_span_as_done(span);
                } else {
                    warn!("clear-int rejected by pending interrupt span; dropping");
                }
            }
            _ => {}
        }
    }

    async fn finalize(&mut self) {
        if let Some(call) = self.call.take() {
            self.finish_call(call).await;
        }
        for span in [self.interrupt.take(), self.msix.take(), self.pci.take()].into_iter().flatten() {
            self.tracer.mark_span_as_done(span);
        }
        for span in self.mmios.drain(..) {
            self.tracer.mark_span_as_done(span);
        }
        for span in self.dmas.drain(..) {
            self.tracer.mark_span_as_done(span);
        }
    }
}
