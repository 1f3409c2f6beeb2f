//! Event model (C1).
//!
//! An [`Event`] is the immutable unit the five external parsers publish.
//! Every event carries a common envelope (timestamp, originating parser) and
//! a kind-specific payload. Events are cheap to clone: the payload fields are
//! plain scalars plus the occasional small string, and the whole value is
//! typically wrapped in an `Arc` by the time it reaches a span (see
//! [`crate::span`]).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Monotonic nanoseconds in the common time base all parsers are assumed to
/// already share. The core never reconciles clock skew between simulators.
pub type Timestamp = u64;

/// Identifies which of the five parallel log streams produced an event.
pub type ParserId = u32;

/// A single observation from one of the co-simulation's log streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: Timestamp,
    pub parser_id: ParserId,
    pub parser_name: Arc<str>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(
        timestamp: Timestamp,
        parser_id: ParserId,
        parser_name: impl Into<Arc<str>>,
        kind: EventKind,
    ) -> Self {
        Self {
            timestamp,
            parser_id,
            parser_name: parser_name.into(),
            kind,
        }
    }
}

/// An Ethernet header, carried by network lifecycle events for matching a
/// dequeue/drop back to its enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthHeader {
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub ether_type: u16,
}

/// An IPv4/IPv6 header, carried by network lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpHeader {
    pub src: String,
    pub dst: String,
    pub proto: u8,
}

/// The fields a `NetDevice` span matches a dequeue/drop against its enqueue
/// with (§4.2 `NetDevice`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEventData {
    pub node: u32,
    pub device: u32,
    pub device_kind: String,
    pub eth_hdr: Option<EthHeader>,
    pub ip_hdr: Option<IpHeader>,
    pub payload_size: u64,
}

/// Every raw event kind the core understands, grouped as in §3 of the
/// specification. Tagged so handlers pattern-match exhaustively instead of
/// downcasting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventKind {
    // --- Host-CPU ---
    HostInstr { pc: u64 },
    HostCall { pc: u64, func: String, component: String },
    HostPostInt,
    HostClearInt,

    // --- Host-PCIe/MMIO ---
    HostMmioR { id: u64, addr: u64, size: u64, bar: u8, offset: u64 },
    HostMmioW { id: u64, addr: u64, size: u64, bar: u8, offset: u64, posted: bool },
    HostMmioImRespPoW,
    HostMmioCR { id: u64 },
    HostMmioCW { id: u64 },
    HostPciRW { offset: u64, size: u64, is_read: bool },
    HostConf { dev: u32, func: u32, reg: u64, bytes: u32, data: u64, is_read: bool },

    // --- Host-DMA/MSI-X ---
    HostDmaR { id: u64, addr: u64, size: u64 },
    HostDmaW { id: u64, addr: u64, size: u64 },
    HostDmaC { id: u64 },
    HostMsiX { vec: u32 },

    // --- NIC ---
    NicMmioR { off: u64, len: u64, val: u64 },
    NicMmioW { off: u64, len: u64, val: u64, posted: bool },
    NicDmaI { id: u64, addr: u64, len: u64 },
    NicDmaEx { id: u64, addr: u64, len: u64 },
    NicDmaCR { id: u64, addr: u64, len: u64 },
    NicDmaCW { id: u64, addr: u64, len: u64 },
    NicTx { len: u64 },
    NicRx { port: u32, len: u64 },
    NicMsix { vec: u32, is_x: bool },
    SetIx { intr: u64 },

    // --- Network ---
    NetworkEnqueue(NetworkEventData),
    NetworkDequeue(NetworkEventData),
    NetworkDrop(NetworkEventData),
}

impl EventKind {
    /// Short, stable name used in logs and OpenTelemetry event names.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::HostInstr { .. } => "host_instr",
            EventKind::HostCall { .. } => "host_call",
            EventKind::HostPostInt => "host_post_int",
            EventKind::HostClearInt => "host_clear_int",
            EventKind::HostMmioR { .. } => "host_mmio_r",
            EventKind::HostMmioW { .. } => "host_mmio_w",
            EventKind::HostMmioImRespPoW => "host_mmio_im_resp_pow",
            EventKind::HostMmioCR { .. } => "host_mmio_cr",
            EventKind::HostMmioCW { .. } => "host_mmio_cw",
            EventKind::HostPciRW { .. } => "host_pci_rw",
            EventKind::HostConf { .. } => "host_conf",
            EventKind::HostDmaR { .. } => "host_dma_r",
            EventKind::HostDmaW { .. } => "host_dma_w",
            EventKind::HostDmaC { .. } => "host_dma_c",
            EventKind::HostMsiX { .. } => "host_msix",
            EventKind::NicMmioR { .. } => "nic_mmio_r",
            EventKind::NicMmioW { .. } => "nic_mmio_w",
            EventKind::NicDmaI { .. } => "nic_dma_i",
            EventKind::NicDmaEx { .. } => "nic_dma_ex",
            EventKind::NicDmaCR { .. } => "nic_dma_cr",
            EventKind::NicDmaCW { .. } => "nic_dma_cw",
            EventKind::NicTx { .. } => "nic_tx",
            EventKind::NicRx { .. } => "nic_rx",
            EventKind::NicMsix { .. } => "nic_msix",
            EventKind::SetIx { .. } => "set_ix",
            EventKind::NetworkEnqueue(_) => "network_enqueue",
            EventKind::NetworkDequeue(_) => "network_dequeue",
            EventKind::NetworkDrop(_) => "network_drop",
        }
    }

    pub fn dma_id(&self) -> Option<u64> {
        match self {
            EventKind::HostDmaR { id, .. }
            | EventKind::HostDmaW { id, .. }
            | EventKind::HostDmaC { id }
            | EventKind::NicDmaI { id, .. }
            | EventKind::NicDmaEx { id, .. }
            | EventKind::NicDmaCR { id, .. }
            | EventKind::NicDmaCW { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn dma_addr(&self) -> Option<u64> {
        match self {
            EventKind::NicDmaI { addr, .. }
            | EventKind::NicDmaEx { addr, .. }
            | EventKind::NicDmaCR { addr, .. }
            | EventKind::NicDmaCW { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    pub fn mmio_id(&self) -> Option<u64> {
        match self {
            EventKind::HostMmioR { id, .. }
            | EventKind::HostMmioW { id, .. }
            | EventKind::HostMmioCR { id }
            | EventKind::HostMmioCW { id } => Some(*id),
            _ => None,
        }
    }

    pub fn mmio_bar(&self) -> Option<u8> {
        match self {
            EventKind::HostMmioR { bar, .. } | EventKind::HostMmioW { bar, .. } => Some(*bar),
            _ => None,
        }
    }

    pub fn network_data(&self) -> Option<&NetworkEventData> {
        match self {
            EventKind::NetworkEnqueue(d)
            | EventKind::NetworkDequeue(d)
            | EventKind::NetworkDrop(d) => Some(d),
            _ => None,
        }
    }
}
