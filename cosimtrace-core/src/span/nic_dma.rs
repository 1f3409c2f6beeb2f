use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, ParserId};

/// A NIC-side DMA transaction span (§4.2 `NicDma`): issue, execute, complete,
/// each stage keyed by matching `(id, addr)` against the issuing event (§8
/// boundary behaviour: an execute or completion with a mismatched id/addr is
/// rejected rather than silently accepted).
pub struct NicDmaSpan {
    pub(crate) core: SpanCore,
    hw_id: u64,
    addr: u64,
}

impl NicDmaSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        _config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self {
            core: SpanCore::new(id, source_id, SpanKind::NicDma, context),
            hw_id: 0,
            addr: 0,
        };
        span.try_add(event).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event) -> bool {
        if !self.core.admits(&event) {
            return false;
        }

        match self.core.events.len() {
            0 => match &event.kind {
                EventKind::NicDmaI { id, addr, .. } => {
                    self.hw_id = *id;
                    self.addr = *addr;
                    self.core.push(event);
                    true
                }
                _ => false,
            },
            1 => match &event.kind {
                EventKind::NicDmaEx { id, addr, .. } if *id == self.hw_id && *addr == self.addr => {
                    self.core.push(event);
                    true
                }
                _ => false,
            },
            _ => match &event.kind {
                EventKind::NicDmaCR { id, addr, .. } | EventKind::NicDmaCW { id, addr, .. }
                    if *id == self.hw_id && *addr == self.addr =>
                {
                    self.core.push(event);
                    self.core.close();
                    true
                }
                _ => false,
            },
        }
    }

    pub(crate) fn hw_id(&self) -> u64 {
        self.hw_id
    }

    pub(crate) fn addr(&self) -> u64 {
        self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_with_mismatched_id_is_rejected() {
        let cfg = SpanningConfig::default();
        let mut span = NicDmaSpan::start(
            1,
            1,
            TraceContext::trace_starting(1),
            Event::new(1, 1, "nic", EventKind::NicDmaI { id: 1, addr: 0x1000, len: 64 }),
            &cfg,
        )
        .unwrap();
        assert!(!span.try_add(Event::new(
            2,
            1,
            "nic",
            EventKind::NicDmaEx { id: 2, addr: 0x1000, len: 64 }
        )));
        assert!(span.try_add(Event::new(
            3,
            1,
            "nic",
            EventKind::NicDmaEx { id: 1, addr: 0x1000, len: 64 }
        )));
        assert!(span.try_add(Event::new(
            4,
            1,
            "nic",
            EventKind::NicDmaCW { id: 1, addr: 0x1000, len: 64 }
        )));
        assert!(!span.core.pending);
    }
}
