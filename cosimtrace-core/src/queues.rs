//! The five named context queues wiring host, NIC, and network spanners
//! together (C5, §6 "Context queue protocol").
//!
//! Each queue carries [`Context`] tokens — "here is the span that caused
//! whatever you're about to observe" — in one fixed causal direction. The
//! directions mirror the real hardware causal graph (host issues MMIO to
//! the device, the device issues DMA/MSI-X back, NIC hands packets to the
//! network and receives them back), which is why the graph is acyclic and
//! no spanner ever waits on a queue it also produces for (§5 "Deadlock
//! avoidance").

use crate::channel::BoundedChannel;
use crate::context::Context;
use std::sync::Arc;

/// One shared handle per direction, cloned into every spanner that touches
/// it. Constructed once at pipeline start-up from [`crate::config::RuntimeConfig`].
#[derive(Clone)]
pub struct ContextQueues {
    pub host_to_nic: Arc<BoundedChannel<Context>>,
    pub nic_to_host: Arc<BoundedChannel<Context>>,
    pub nic_to_network: Arc<BoundedChannel<Context>>,
    pub network_to_nic: Arc<BoundedChannel<Context>>,
    pub network_to_host: Arc<BoundedChannel<Context>>,
}

impl ContextQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            host_to_nic: BoundedChannel::new(capacity),
            nic_to_host: BoundedChannel::new(capacity),
            nic_to_network: BoundedChannel::new(capacity),
            network_to_nic: BoundedChannel::new(capacity),
            network_to_host: BoundedChannel::new(capacity),
        }
    }

    /// Closes every queue, waking any spanner blocked on a `pop` with
    /// end-of-stream (§5 "Cancellation / shutdown").
    pub async fn close_all(&self) {
        self.host_to_nic.close().await;
        self.nic_to_host.close().await;
        self.nic_to_network.close().await;
        self.network_to_nic.close().await;
        self.network_to_host.close().await;
    }
}

/// Pops from `queue`, logging and discarding a context whose expectation
/// doesn't match what the caller needed instead of treating it as fatal
/// (§7 "Missing expected context"). Returns `None` on a closed/poisoned
/// queue or after discarding a mismatched context — in both cases the
/// caller should reject the event it was trying to build a span for.
pub async fn pop_expecting(
    queue: &BoundedChannel<Context>,
    expectation: crate::context::Expectation,
) -> Option<Context> {
    let context = queue.pop().await?;
    if context.is_expectation(expectation) {
        Some(context)
    } else {
        tracing::warn!(
            expected = %expectation,
            got = %context.expectation(),
            "context queue produced a non-matching expectation; dropping"
        );
        None
    }
}
