use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, ParserId};

/// A host-side MSI-X delivery span (§4.2 `HostMsix`). Starts on `HostMsiX`
/// and completes only on a DMA completion carrying id `0` — the sentinel the
/// original uses for "this DMA completion is the MSI-X write itself", not a
/// tracked DMA transaction. Any other DMA completion id is out of band and
/// must be rejected, leaving the span pending (§8 boundary behaviour).
pub struct HostMsixSpan {
    pub(crate) core: SpanCore,
    vec: u32,
}

impl HostMsixSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        _config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self {
            core: SpanCore::new(id, source_id, SpanKind::HostMsix, context),
            vec: 0,
        };
        span.try_add(event).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event) -> bool {
        if !self.core.admits(&event) {
            return false;
        }

        if self.core.events.is_empty() {
            return match &event.kind {
                EventKind::HostMsiX { vec } => {
                    self.vec = *vec;
                    self.core.push(event);
                    true
                }
                _ => false,
            };
        }

        match &event.kind {
            EventKind::HostDmaC { id: 0 } => {
                self.core.push(event);
                self.core.close();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn vector(&self) -> u32 {
        self.vec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nonzero_dma_completion_and_stays_pending() {
        let cfg = SpanningConfig::default();
        let mut span = HostMsixSpan::start(
            1,
            1,
            TraceContext::trace_starting(1),
            Event::new(1, 1, "host", EventKind::HostMsiX { vec: 3 }),
            &cfg,
        )
        .unwrap();
        assert!(!span.try_add(Event::new(2, 1, "host", EventKind::HostDmaC { id: 9 })));
        assert!(span.core.pending);
        assert!(span.try_add(Event::new(3, 1, "host", EventKind::HostDmaC { id: 0 })));
        assert!(!span.core.pending);
    }
}
