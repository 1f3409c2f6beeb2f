use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, ParserId};

/// A single-event NIC-side MSI-X raise span (§4.2 `NicMsix`).
pub struct NicMsixSpan {
    pub(crate) core: SpanCore,
    vec: u32,
    is_x: bool,
}

impl NicMsixSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        _config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self {
            core: SpanCore::new(id, source_id, SpanKind::NicMsix, context),
            vec: 0,
            is_x: false,
        };
        span.try_add(event).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event) -> bool {
        if !self.core.admits(&event) {
            return false;
        }
        match &event.kind {
            EventKind::NicMsix { vec, is_x } => {
                self.vec = *vec;
                self.is_x = *is_x;
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

    pub(crate) fn is_x(&self) -> bool {
        self.is_x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_immediately() {
        let cfg = SpanningConfig::default();
        let span = NicMsixSpan::start(
            1,
            1,
            TraceContext::trace_starting(1),
            Event::new(1, 1, "nic", EventKind::NicMsix { vec: 2, is_x: true }),
            &cfg,
        )
        .unwrap();
        assert!(!span.core.pending);
    }
}
