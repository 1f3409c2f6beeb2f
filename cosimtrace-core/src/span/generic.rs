use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, ParserId};

/// Fallback span kind: wraps exactly one event of any kind, then closes.
/// Used for events no spanner recognizes as the start of a richer span but
/// that still need a trace presence (§4.2 `Generic`).
pub struct GenericSpan {
    pub(crate) core: SpanCore,
}

impl GenericSpan {
    pub fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        _config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self { core: SpanCore::new(id, source_id, SpanKind::Generic, context) };
        span.try_add(event).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event) -> bool {
        if !self.core.admits(&event) {
            return false;
        }
        self.core.push(event);
        self.core.close();
        true
    }
}
