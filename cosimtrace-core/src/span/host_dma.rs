use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, ParserId};

/// A host-side DMA transaction span (§4.2 `HostDma`): a read or write issue
/// followed by its completion, matched by hardware id.
pub struct HostDmaSpan {
    pub(crate) core: SpanCore,
    hw_id: u64,
    is_read: bool,
}

impl HostDmaSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        _config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self {
            core: SpanCore::new(id, source_id, SpanKind::HostDma, context),
            hw_id: 0,
            is_read: false,
        };
        span.try_add(event).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event) -> bool {
        if !self.core.admits(&event) {
            return false;
        }

        if self.core.events.is_empty() {
            return match &event.kind {
                EventKind::HostDmaR { id, .. } => {
                    self.is_read = true;
                    self.hw_id = *id;
                    self.core.push(event);
                    true
                }
                EventKind::HostDmaW { id, .. } => {
                    self.is_read = false;
                    self.hw_id = *id;
                    self.core.push(event);
                    true
                }
                _ => false,
            };
        }

        match &event.kind {
            EventKind::HostDmaC { id } if *id == self.hw_id => {
                self.core.push(event);
                self.core.close();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn hw_id(&self) -> u64 {
        self.hw_id
    }

    pub(crate) fn is_read(&self) -> bool {
        self.is_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_completes_on_matching_id() {
        let cfg = SpanningConfig::default();
        let mut span = HostDmaSpan::start(
            1,
            1,
            TraceContext::trace_starting(1),
            Event::new(10, 1, "host", EventKind::HostDmaW { id: 5, addr: 0, size: 64 }),
            &cfg,
        )
        .unwrap();
        assert!(!span.try_add(Event::new(20, 1, "host", EventKind::HostDmaC { id: 6 })));
        assert!(span.core.pending);
        assert!(span.try_add(Event::new(25, 1, "host", EventKind::HostDmaC { id: 5 })));
        assert!(!span.core.pending);
    }
}
