use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, ParserId};

/// A host-side config-space access span (§4.2 `HostPci`): a `HostPciRW`
/// issue completed by a `HostConf` whose direction must match.
pub struct HostPciSpan {
    pub(crate) core: SpanCore,
    is_read: bool,
}

impl HostPciSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        _config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self {
            core: SpanCore::new(id, source_id, SpanKind::HostPci, context),
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
                EventKind::HostPciRW { is_read, .. } => {
                    self.is_read = *is_read;
                    self.core.push(event);
                    true
                }
                _ => false,
            };
        }

        match &event.kind {
            EventKind::HostConf { is_read, .. } if *is_read == self.is_read => {
                self.core.push(event);
                self.core.close();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_read(&self) -> bool {
        self.is_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_direction_must_match() {
        let cfg = SpanningConfig::default();
        let mut span = HostPciSpan::start(
            1,
            1,
            TraceContext::trace_starting(1),
            Event::new(1, 1, "host", EventKind::HostPciRW { offset: 0, size: 4, is_read: true }),
            &cfg,
        )
        .unwrap();
        assert!(!span.try_add(Event::new(
            2,
            1,
            "host",
            EventKind::HostConf { dev: 0, func: 0, reg: 0, bytes: 4, data: 0, is_read: false }
        )));
        assert!(span.try_add(Event::new(
            3,
            1,
            "host",
            EventKind::HostConf { dev: 0, func: 0, reg: 0, bytes: 4, data: 0, is_read: true }
        )));
        assert!(!span.core.pending);
    }
}
