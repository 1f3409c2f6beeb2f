use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, ParserId};

/// A single-event NIC transmit/receive span (§4.2 `NicEth`).
pub struct NicEthSpan {
    pub(crate) core: SpanCore,
}

impl NicEthSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        _config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self { core: SpanCore::new(id, source_id, SpanKind::NicEth, context) };
        span.try_add(event).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event) -> bool {
        if !self.core.admits(&event) {
            return false;
        }
        match &event.kind {
            EventKind::NicTx { .. } | EventKind::NicRx { .. } => {
                self.core.push(event);
                self.core.close();
                true
            }
            _ => false,
        }
    }
}
