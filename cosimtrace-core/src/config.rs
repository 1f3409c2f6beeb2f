//! Read-only configuration the core consumes (§6 "Symbol/config lookups").
//!
//! The core never loads this from disk itself — that is the ambient binary
//! crate's job (`cosimtrace::config`) — it only consumes the finished,
//! validated value. Validation failures are fatal start-up errors, not
//! data-path warnings, per §7's propagation policy.

use crate::error::{CoreResult, TraceError};
use std::collections::HashSet;

/// Symbol sets and numeric thresholds the span state machines and spanners
/// consult while classifying events. Immutable once constructed.
#[derive(Debug, Clone, Default)]
pub struct SpanningConfig {
    /// Function names that start a new `HostCall` span (§4.2 `HostCall`).
    pub syscall_entry: HashSet<String>,
    /// Function names indicating the syscall is on the kernel transmit path.
    pub kernel_tx: HashSet<String>,
    /// Function names indicating the syscall is on the kernel receive path.
    pub kernel_rx: HashSet<String>,
    /// Function names indicating the syscall is on the driver transmit path.
    pub driver_tx: HashSet<String>,
    /// Function names indicating the syscall is on the driver receive path.
    pub driver_rx: HashSet<String>,
    /// `HostCall` function names that indicate a PCI configuration write is
    /// imminent (§4.3 HostSpanner PCI handling).
    pub pci_write_indicators: HashSet<String>,
    /// The PCI BAR number the MSI-X table lives behind.
    pub msix_bar: u8,
    /// BAR numbers addressed by the device (as opposed to host-only BARs).
    pub to_device_bars: HashSet<u8>,
    /// `(node, device)` pairs the `NetworkSpanner` tracks (§4.5).
    pub interesting_network_devices: HashSet<(u32, u32)>,
}

impl SpanningConfig {
    pub fn is_syscall_entry(&self, func: &str) -> bool {
        self.syscall_entry.contains(func)
    }

    pub fn is_kernel_tx(&self, func: &str) -> bool {
        self.kernel_tx.contains(func)
    }

    pub fn is_kernel_rx(&self, func: &str) -> bool {
        self.kernel_rx.contains(func)
    }

    pub fn is_driver_tx(&self, func: &str) -> bool {
        self.driver_tx.contains(func)
    }

    pub fn is_driver_rx(&self, func: &str) -> bool {
        self.driver_rx.contains(func)
    }

    pub fn is_pci_write_indicator(&self, func: &str) -> bool {
        self.pci_write_indicators.contains(func)
    }

    pub fn is_msix_bar(&self, bar: u8) -> bool {
        bar == self.msix_bar
    }

    pub fn is_to_device_bar(&self, bar: u8) -> bool {
        self.to_device_bars.contains(&bar)
    }

    /// A read to the MSI-X BAR that is *not* a to-device access completes on
    /// the read alone (§4.2 `HostMmio`, shape 4).
    pub fn is_msix_not_to_device_bar(&self, bar: u8) -> bool {
        self.is_msix_bar(bar) && !self.is_to_device_bar(bar)
    }

    pub fn is_interesting_network_device(&self, node: u32, device: u32) -> bool {
        self.interesting_network_devices.contains(&(node, device))
    }

    /// Fatal start-up validation (§7 "Configuration and start-up errors are
    /// fatal"). A pipeline is never started against an invalid config.
    pub fn validate(&self) -> CoreResult<()> {
        if self.syscall_entry.is_empty() {
            return Err(TraceError::ConfigInvalid(
                "syscall_entry symbol set must not be empty".into(),
            ));
        }
        if self.interesting_network_devices.is_empty() {
            return Err(TraceError::ConfigInvalid(
                "interesting_network_devices must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Process-wide runtime sizing (§6 "Config surface").
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_cpu_threads: usize,
    pub max_background_threads: usize,
    /// Capacity shared by every bounded channel the pipeline creates, unless
    /// overridden per-queue.
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_cpu_threads: num_cpus_fallback(),
            max_background_threads: 2,
            channel_capacity: 1024,
        }
    }
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
