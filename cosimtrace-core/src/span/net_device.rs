use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, NetworkEventData, ParserId};

/// A network-device lifecycle span (§4.2 `NetDevice`): an enqueue matched by
/// a structurally identical dequeue or drop. A dequeue/drop that does not
/// match any pending enqueue is rejected rather than silently starting a new
/// span for it (§9 open-question decision, see DESIGN.md).
pub struct NetDeviceSpan {
    pub(crate) core: SpanCore,
    enqueue_data: Option<NetworkEventData>,
    dropped: bool,
}

impl NetDeviceSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        _config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self {
            core: SpanCore::new(id, source_id, SpanKind::NetDevice, context),
            enqueue_data: None,
            dropped: false,
        };
        span.try_add(event).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event) -> bool {
        if !self.core.admits(&event) {
            return false;
        }

        if self.core.events.is_empty() {
            return match &event.kind {
                EventKind::NetworkEnqueue(data) => {
                    self.enqueue_data = Some(data.clone());
                    self.core.push(event);
                    true
                }
                _ => false,
            };
        }

        match &event.kind {
            EventKind::NetworkDequeue(data) if Some(data) == self.enqueue_data.as_ref() => {
                self.core.push(event);
                self.core.close();
                true
            }
            EventKind::NetworkDrop(data) if Some(data) == self.enqueue_data.as_ref() => {
                self.dropped = true;
                self.core.push(event);
                self.core.close();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn dropped(&self) -> bool {
        self.dropped
    }
}
