use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, ParserId};

/// A single-event NIC-side MMIO access span (§4.2 `NicMmio`): the firmware
/// log carries no separate completion record, so the span closes on the
/// same event that opens it.
pub struct NicMmioSpan {
    pub(crate) core: SpanCore,
}

impl NicMmioSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        _config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self { core: SpanCore::new(id, source_id, SpanKind::NicMmio, context) };
        span.try_add(event).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event) -> bool {
        if !self.core.admits(&event) {
            return false;
        }
        match &event.kind {
            EventKind::NicMmioR { .. } | EventKind::NicMmioW { .. } => {
                self.core.push(event);
                self.core.close();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_immediately() {
        let cfg = SpanningConfig::default();
        let span = NicMmioSpan::start(
            1,
            1,
            TraceContext::trace_starting(1),
            Event::new(1, 1, "nic", EventKind::NicMmioR { off: 0, len: 4, val: 0 }),
            &cfg,
        )
        .unwrap();
        assert!(!span.core.pending);
    }
}
