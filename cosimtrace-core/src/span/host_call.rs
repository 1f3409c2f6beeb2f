use super::{SpanCore, SpanKind};
use crate::config::SpanningConfig;
use crate::context::{SpanId, TraceContext};
use crate::event::{Event, EventKind, ParserId};

/// A syscall-entry span (§4.2 `HostCall`). Accumulates consecutive
/// `HostCall` events until the next syscall-entry symbol closes it.
pub struct HostCallSpan {
    pub(crate) core: SpanCore,
    /// `true` if this span was started by an event that was *not* a
    /// configured syscall-entry symbol — it will close on the first
    /// subsequent entry instead of requiring one to start.
    fragmented: bool,
    kernel_tx: bool,
    kernel_rx: bool,
    driver_tx: bool,
    driver_rx: bool,
}

impl HostCallSpan {
    pub(crate) fn start(
        id: SpanId,
        source_id: ParserId,
        context: TraceContext,
        event: Event,
        config: &SpanningConfig,
    ) -> Option<Self> {
        let mut span = Self {
            core: SpanCore::new(id, source_id, SpanKind::HostCall, context),
            fragmented: false,
            kernel_tx: false,
            kernel_rx: false,
            driver_tx: false,
            driver_rx: false,
        };
        span.try_add(event, config).then_some(span)
    }

    pub(crate) fn try_add(&mut self, event: Event, config: &SpanningConfig) -> bool {
        if !self.core.admits(&event) {
            return false;
        }
        let func = match &event.kind {
            EventKind::HostCall { func, .. } => func.clone(),
            _ => return false,
        };
        let is_entry = config.is_syscall_entry(&func);

        if self.core.events.is_empty() {
            self.fragmented = !is_entry;
            self.apply_indicators(&func, config);
            self.core.push(event);
            return true;
        }

        if is_entry {
            // The next syscall entry closes this span; the caller starts a
            // fresh one with the same event.
            self.core.close();
            return false;
        }

        self.apply_indicators(&func, config);
        self.core.push(event);
        true
    }

    fn apply_indicators(&mut self, func: &str, config: &SpanningConfig) {
        if config.is_kernel_tx(func) {
            self.kernel_tx = true;
        }
        if config.is_kernel_rx(func) {
            self.kernel_rx = true;
        }
        if config.is_driver_tx(func) {
            self.driver_tx = true;
        }
        if config.is_driver_rx(func) {
            self.driver_rx = true;
        }
    }

    pub(crate) fn fragmented(&self) -> bool {
        self.fragmented
    }

    pub(crate) fn kernel_tx(&self) -> bool {
        self.kernel_tx
    }

    pub(crate) fn kernel_rx(&self) -> bool {
        self.kernel_rx
    }

    pub(crate) fn driver_tx(&self) -> bool {
        self.driver_tx
    }

    pub(crate) fn driver_rx(&self) -> bool {
        self.driver_rx
    }

    /// Produces an independent copy of this span under a fresh id, used by
    /// `HostSpanner` to fan a single receive-side call span out to every
    /// `Context{Rx}` that arrived ahead of it (§4.3 "Call").
    pub(crate) fn fork(&self, new_id: SpanId) -> Self {
        Self {
            core: SpanCore { id: new_id, ..self.core.clone() },
            fragmented: self.fragmented,
            kernel_tx: self.kernel_tx,
            kernel_rx: self.kernel_rx,
            driver_tx: self.driver_tx,
            driver_rx: self.driver_rx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TraceContext;
    use std::collections::HashSet;

    fn config() -> SpanningConfig {
        SpanningConfig {
            syscall_entry: HashSet::from(["sys_sendto".to_string(), "sys_recvfrom".to_string()]),
            kernel_tx: HashSet::from(["sys_sendto".to_string()]),
            kernel_rx: HashSet::from(["sys_recvfrom".to_string()]),
            ..Default::default()
        }
    }

    fn call_event(ts: u64, func: &str) -> Event {
        Event::new(ts, 1, "host", EventKind::HostCall {
            pc: 0,
            func: func.to_string(),
            component: "kernel".to_string(),
        })
    }

    #[test]
    fn closes_on_next_entry_symbol_and_rejects_it() {
        let cfg = config();
        let mut span =
            HostCallSpan::start(1, 1, TraceContext::trace_starting(1), call_event(100, "sys_sendto"), &cfg)
                .unwrap();
        assert!(span.try_add(call_event(110, "tcp_transmit_skb"), &cfg));
        assert!(span.core.pending);
        assert!(span.kernel_tx());

        let accepted = span.try_add(call_event(120, "sys_recvfrom"), &cfg);
        assert!(!accepted);
        assert!(!span.core.pending);
    }

    #[test]
    fn fragmented_span_closes_on_first_entry() {
        let cfg = config();
        let mut span = HostCallSpan::start(
            1,
            1,
            TraceContext::trace_starting(1),
            call_event(50, "tcp_transmit_skb"),
            &cfg,
        )
        .unwrap();
        assert!(span.fragmented());
        assert!(!span.try_add(call_event(60, "sys_sendto"), &cfg));
        assert!(!span.core.pending);
    }
}
