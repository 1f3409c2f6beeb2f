use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, ParserId};

/// A posted/cleared legacy interrupt span (§4.2 `HostInt`). No nesting: a
/// second `HostPostInt` before the matching clear is out of scope for this
/// span and must be rejected by `admits`/the caller starting a sibling span.
pub struct HostIntSpan {
    pub(crate) core: SpanCore,
}

impl HostIntSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        _config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self { core: SpanCore::new(id, source_id, SpanKind::HostInt, context) };
        span.try_add(event).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event) -> bool {
        if !self.core.admits(&event) {
            return false;
        }

        if self.core.events.is_empty() {
            return match &event.kind {
                EventKind::HostPostInt => {
                    self.core.push(event);
                    true
                }
                _ => false,
            };
        }

        match &event.kind {
            EventKind::HostClearInt => {
                self.core.push(event);
                self.core.close();
                true
            }
            _ => false,
        }
    }
}
