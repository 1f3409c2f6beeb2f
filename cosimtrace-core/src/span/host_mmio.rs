use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, ParserId};

/// An MMIO transaction span (§4.2 `HostMmio`). Accepts one of four shapes:
/// non-posted write + completion, posted write + immediate response, read +
/// completion, or a lone MSI-X-bar read that completes itself.
pub struct HostMmioSpan {
    pub(crate) core: SpanCore,
    hw_id: u64,
    bar: u8,
    is_read: bool,
    posted: bool,
}

impl HostMmioSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self {
            core: SpanCore::new(id, source_id, SpanKind::HostMmio, context),
            hw_id: 0,
            bar: 0,
            is_read: false,
            posted: false,
        };
        span.try_add(event, config).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event, config: &SpanningConfig) -> bool {
        if !self.core.admits(&event) {
            return false;
        }

        if self.core.events.is_empty() {
            return match &event.kind {
                EventKind::HostMmioR { id, bar, .. } => {
                    self.is_read = true;
                    self.hw_id = *id;
                    self.bar = *bar;
                    let msix_complete = config.is_msix_not_to_device_bar(*bar);
                    self.core.push(event);
                    if msix_complete {
                        self.core.close();
                    }
                    true
                }
                EventKind::HostMmioW { id, bar, posted, .. } => {
                    self.is_read = false;
                    self.hw_id = *id;
                    self.bar = *bar;
                    self.posted = *posted;
                    self.core.push(event);
                    true
                }
                _ => false,
            };
        }

        let start_ts = self.core.events[0].timestamp;
        match &event.kind {
            EventKind::HostMmioCR { id } if self.is_read && *id == self.hw_id => {
                self.core.push(event);
                self.core.close();
                true
            }
            EventKind::HostMmioCW { id } if !self.is_read && *id == self.hw_id => {
                self.core.push(event);
                self.core.close();
                true
            }
            EventKind::HostMmioImRespPoW if !self.is_read && self.posted && event.timestamp == start_ts => {
                self.core.push(event);
                self.core.close();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn bar(&self) -> u8 {
        self.bar
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

    fn cfg() -> SpanningConfig {
        SpanningConfig {
            msix_bar: 3,
            to_device_bars: std::collections::HashSet::from([0u8, 1]),
            ..Default::default()
        }
    }

    #[test]
    fn non_posted_read_completes_on_matching_id() {
        let cfg = cfg();
        let mut span = HostMmioSpan::start(
            1,
            1,
            TraceContext::trace_starting(1),
            Event::new(100, 1, "host", EventKind::HostMmioR { id: 42, addr: 0, size: 4, bar: 0, offset: 0 }),
            &cfg,
        )
        .unwrap();
        assert!(span.core.pending);
        assert!(span.try_add(
            Event::new(150, 1, "host", EventKind::HostMmioCR { id: 42 }),
            &cfg
        ));
        assert!(!span.core.pending);
        assert_eq!(span.core.start_ts(), Some(100));
        assert_eq!(span.core.end_ts(), Some(150));
    }

    #[test]
    fn posted_write_completes_on_im_resp_alone() {
        let cfg = cfg();
        let mut span = HostMmioSpan::start(
            1,
            1,
            TraceContext::trace_starting(1),
            Event::new(200, 1, "host", EventKind::HostMmioW {
                id: 7,
                addr: 0,
                size: 4,
                bar: 1,
                offset: 0,
                posted: true,
            }),
            &cfg,
        )
        .unwrap();
        assert!(span.try_add(Event::new(200, 1, "host", EventKind::HostMmioImRespPoW), &cfg));
        assert!(!span.core.pending);
        assert_eq!(span.core.end_ts(), Some(200));
    }

    #[test]
    fn msix_bar_read_completes_alone() {
        let cfg = cfg();
        let span = HostMmioSpan::start(
            1,
            1,
            TraceContext::trace_starting(1),
            Event::new(10, 1, "host", EventKind::HostMmioR { id: 1, addr: 0, size: 4, bar: 3, offset: 0 }),
            &cfg,
        )
        .unwrap();
        assert!(!span.core.pending);
    }
}
