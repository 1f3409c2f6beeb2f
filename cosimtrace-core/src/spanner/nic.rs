use crate::channel::BoundedChannel;
use crate::config::SpanningConfig;
use crate::context::{Context, Expectation};
use crate::event::{Event, EventKind, ParserId};
use crate::queues::{pop_expecting, ContextQueues};
use crate::span::{NicDmaSpan, NicEthSpan, NicMmioSpan, NicMsixSpan, Span};
use crate::tracer::Tracer;
use std::sync::Arc;
use tracing::warn;

/// Consumes the NIC firmware event stream (§4.4). Holds the most recently
/// completed span (the default parent for whatever comes next) and a list
/// of in-flight DMA transactions.
pub struct NicSpanner {
    source_id: ParserId,
    tracer: Arc<Tracer>,
    config: Arc<SpanningConfig>,
    queues: ContextQueues,

    last_completed: Option<Span>,
    dmas: Vec<Span>,
}

impl NicSpanner {
    pub fn new(
        source_id: ParserId,
        tracer: Arc<Tracer>,
        config: Arc<SpanningConfig>,
        queues: ContextQueues,
    ) -> Self {
        Self { source_id, tracer, config, queues, last_completed: None, dmas: Vec::new() }
    }

    pub async fn run(mut self, input: Arc<BoundedChannel<Event>>) {
        while let Some(event) = input.pop().await {
            self.handle_event(event).await;
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match &event.kind {
            EventKind::NicMmioR { .. } | EventKind::NicMmioW { .. } => self.handle_mmio(event).await,
            EventKind::NicDmaI { .. }
            | EventKind::NicDmaEx { .. }
            | EventKind::NicDmaCR { .. }
            | EventKind::NicDmaCW { .. } => self.handle_dma(event).await,
            EventKind::NicTx { .. } => self.handle_tx(event).await,
            EventKind::NicRx { .. } => self.handle_rx(event).await,
            EventKind::NicMsix { .. } => self.handle_msix(event).await,
            other => warn!(kind = other.name(), "nic spanner: unhandled event kind"),
        }
    }

    async fn handle_mmio(&mut self, event: Event) {
        let Some(ctx) = pop_expecting(&self.queues.host_to_nic, Expectation::Mmio).await else {
            return;
        };
        if let Some(span) = self.tracer.start_span_by_parent_pass_on_context(
            self.source_id,
            event,
            &self.config,
            &ctx,
            NicMmioSpan::start,
            Span::NicMmio,
        ) {
            self.tracer.mark_span_as_done(span.clone());
            self.last_completed = Some(span);
        }
    }

    async fn handle_dma(&mut self, event: Event) {
        for span in self.dmas.iter() {
            if span.try_add(event.clone(), &self.config) {
                let completed = span.is_complete();
                let is_execute = matches!(event.kind, EventKind::NicDmaEx { .. });
                let span = span.clone();
                if is_execute {
                    let _ = self.queues.nic_to_host.push(Context::new(Expectation::Dma, span.clone())).await;
                }
                if completed {
                    self.tracer.mark_span_as_done(span.clone());
                    self.last_completed = Some(span);
                }
                self.dmas.retain(|s| !s.is_complete());
                return;
            }
        }

        if let EventKind::NicDmaI { .. } = &event.kind {
            let parent = self.last_completed.clone();
            let span = match parent {
                Some(parent) => self.tracer.start_span_by_parent(
                    self.source_id,
                    event,
                    &self.config,
                    &parent,
                    NicDmaSpan::start,
                    Span::NicDma,
                ),
                None => {
                    self.tracer.start_span(self.source_id, event, &self.config, NicDmaSpan::start, Span::NicDma)
                }
            };
            if let Some(span) = span {
                self.dmas.push(span);
            }
        } else {
            warn!("nic dma continuation with no matching pending transaction; dropping");
        }
    }

    async fn handle_tx(&mut self, event: Event) {
        let parent = self.last_completed.clone();
        let span = match parent {
            Some(parent) => self.tracer.start_span_by_parent(
                self.source_id,
                event,
                &self.config,
                &parent,
                NicEthSpan::start,
                Span::NicEth,
            ),
            None => self.tracer.start_span(self.source_id, event, &self.config, NicEthSpan::start, Span::NicEth),
        };
        let Some(span) = span else { return };
        self.tracer.mark_span_as_done(span.clone());
        self.last_completed = Some(span.clone());
        let _ = self.queues.nic_to_network.push(Context::new(Expectation::Rx, span)).await;
    }

    async fn handle_rx(&mut self, event: Event) {
        let Some(ctx) = pop_expecting(&self.queues.network_to_nic, Expectation::Rx).await else {
            return;
        };
        if let Some(span) = self.tracer.start_span_by_parent_pass_on_context(
            self.source_id,
            event,
            &self.config,
            &ctx,
            NicEthSpan::start,
            Span::NicEth,
        ) {
            self.tracer.mark_span_as_done(span.clone());
            self.last_completed = Some(span);
        }
    }

    async fn handle_msix(&mut self, event: Event) {
        let parent = self.last_completed.clone();
        let span = match parent {
            Some(parent) => self.tracer.start_span_by_parent(
                self.source_id,
                event,
                &self.config,
                &parent,
                NicMsixSpan::start,
                Span::NicMsix,
            ),
            None => {
                self.tracer.start_span(self.source_id, event, &self.config, NicMsixSpan::start, Span::NicMsix)
            }
        };
        let Some(span) = span else { return };
        self.tracer.mark_span_as_done(span.clone());
        self.last_completed = Some(span.clone());
        let _ = self.queues.nic_to_host.push(Context::new(Expectation::Msix, span)).await;
    }
}
