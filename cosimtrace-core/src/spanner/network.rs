use crate::channel::BoundedChannel;
use crate::config::SpanningConfig;
use crate::context::{Context, Expectation};
use crate::event::{Event, EventKind, NetworkEventData, ParserId};
use crate::queues::{pop_expecting, ContextQueues};
use crate::span::{NetDeviceSpan, Span};
use crate::tracer::Tracer;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Identifies one packet across the hops of its path, independent of which
/// (node, device) it is currently transiting. `EthHeader`/`IpHeader` don't
/// derive `Hash`, so this is built from their fields directly.
type PacketKey = (Option<([u8; 6], [u8; 6], u16)>, Option<(String, String, u8)>, u64);

fn packet_key(data: &NetworkEventData) -> PacketKey {
    (
        data.eth_hdr.as_ref().map(|h| (h.src_mac, h.dst_mac, h.ether_type)),
        data.ip_hdr.as_ref().map(|h| (h.src.clone(), h.dst.clone(), h.proto)),
        data.payload_size,
    )
}

/// Consumes packet lifecycle events for every (node, device) pair, filtered
/// down to the configured interest set (§4.5). For the first device on a
/// packet's path, parent is a `Context{Rx}` popped from `nic_to_network`;
/// for later devices on the same path, parent is the previous device's span
/// — tracked per packet in `paths`, not as a single spanner-wide slot, so
/// interleaved packets on different paths don't parent onto each other.
pub struct NetworkSpanner {
    source_id: ParserId,
    tracer: Arc<Tracer>,
    config: Arc<SpanningConfig>,
    queues: ContextQueues,

    pending: HashMap<(u32, u32), Span>,
    paths: HashMap<PacketKey, Span>,
}

impl NetworkSpanner {
    pub fn new(
        source_id: ParserId,
        tracer: Arc<Tracer>,
        config: Arc<SpanningConfig>,
        queues: ContextQueues,
    ) -> Self {
        Self { source_id, tracer, config, queues, pending: HashMap::new(), paths: HashMap::new() }
    }

    pub async fn run(mut self, input: Arc<BoundedChannel<Event>>) {
        while let Some(event) = input.pop().await {
            self.handle_event(event).await;
        }
    }

    async fn handle_event(&mut self, event: Event) {
        let Some(data) = event.kind.network_data() else {
            warn!(kind = event.kind.name(), "network spanner: unhandled event kind");
            return;
        };
        if !self.config.is_interesting_network_device(data.node, data.device) {
            return;
        }
        let key = (data.node, data.device);
        let path = packet_key(data);

        match &event.kind {
            EventKind::NetworkEnqueue(_) => self.handle_enqueue(key, path, event).await,
            EventKind::NetworkDequeue(_) | EventKind::NetworkDrop(_) => {
                self.handle_completion(key, path, event).await
            }
            _ => {}
        }
    }

    async fn handle_enqueue(&mut self, key: (u32, u32), path: PacketKey, event: Event) {
        let span = match self.paths.get(&path).cloned() {
            Some(parent) => self.tracer.start_span_by_parent(
                self.source_id,
                event,
                &self.config,
                &parent,
                NetDeviceSpan::start,
                Span::NetDevice,
            ),
            None => {
                // First device on this path: the arrival was handed off by
                // the NIC's transmit-side publish to `nic_to_network`.
                let Some(ctx) = pop_expecting(&self.queues.nic_to_network, Expectation::Rx).await else {
                    return;
                };
                self.tracer.start_span_by_parent_pass_on_context(
                    self.source_id,
                    event,
                    &self.config,
                    &ctx,
                    NetDeviceSpan::start,
                    Span::NetDevice,
                )
            }
        };
        if let Some(span) = span {
            self.pending.insert(key, span);
        }
    }

    async fn handle_completion(&mut self, key: (u32, u32), path: PacketKey, event: Event) {
        let Some(span) = self.pending.get(&key).cloned() else {
            warn!(node = key.0, device = key.1, "network completion with no pending enqueue; dropping");
            return;
        };
        let dropped = matches!(event.kind, EventKind::NetworkDrop(_));
        if !span.try_add(event, &self.config) {
            warn!(node = key.0, device = key.1, "network completion did not structurally match its enqueue");
            return;
        }
        self.pending.remove(&key);
        self.tracer.mark_span_as_done(span.clone());
        if dropped {
            // The path terminates here; a later enqueue with the same
            // packet key is a different packet, not the next hop.
            self.paths.remove(&path);
        } else {
            self.paths.insert(path, span.clone());
        }
        let _ = self.queues.network_to_nic.push(Context::new(Expectation::Rx, span.clone())).await;
        let _ = self.queues.network_to_host.push(Context::new(Expectation::Rx, span)).await;
    }
}
