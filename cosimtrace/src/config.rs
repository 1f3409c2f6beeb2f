//! TOML configuration surface (§3 A1). The core never reads a file itself —
//! this module loads, deserializes, and validates, then hands the core a
//! plain [`SpanningConfig`]/[`RuntimeConfig`] pair.

use cosimtrace_core::error::{CoreResult, TraceError};
use cosimtrace_core::{RuntimeConfig, SpanningConfig};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    symbols: RawSymbols,
    #[serde(default)]
    pci: RawPci,
    #[serde(default)]
    network: RawNetwork,
    #[serde(default)]
    runtime: RawRuntime,
}

#[derive(Debug, Deserialize, Default)]
struct RawSymbols {
    #[serde(default)]
    syscall_entry: HashSet<String>,
    #[serde(default)]
    kernel_tx: HashSet<String>,
    #[serde(default)]
    kernel_rx: HashSet<String>,
    #[serde(default)]
    driver_tx: HashSet<String>,
    #[serde(default)]
    driver_rx: HashSet<String>,
    #[serde(default)]
    pci_write_indicators: HashSet<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawPci {
    #[serde(default)]
    msix_bar: u8,
    #[serde(default)]
    to_device_bars: HashSet<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct RawNetwork {
    #[serde(default)]
    interesting_devices: Vec<(u32, u32)>,
}

#[derive(Debug, Deserialize)]
struct RawRuntime {
    max_cpu_threads: Option<usize>,
    max_background_threads: Option<usize>,
    channel_capacity: Option<usize>,
}

impl Default for RawRuntime {
    fn default() -> Self {
        Self { max_cpu_threads: None, max_background_threads: None, channel_capacity: None }
    }
}

/// The fully loaded, validated configuration a `run`/`replay` invocation
/// hands to the core.
pub struct CosimtraceConfig {
    pub spanning: SpanningConfig,
    pub runtime: RuntimeConfig,
}

/// Loads and validates a TOML config file. Returns [`TraceError::ConfigInvalid`]
/// on a malformed file or a failed `SpanningConfig::validate` (§7
/// "Configuration and start-up errors are fatal").
pub fn load(path: &Path) -> CoreResult<CosimtraceConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| TraceError::ConfigInvalid(format!("reading {}: {e}", path.display())))?;
    let raw: RawConfig = toml::from_str(&text)
        .map_err(|e| TraceError::ConfigInvalid(format!("parsing {}: {e}", path.display())))?;

    let spanning = SpanningConfig {
        syscall_entry: raw.symbols.syscall_entry,
        kernel_tx: raw.symbols.kernel_tx,
        kernel_rx: raw.symbols.kernel_rx,
        driver_tx: raw.symbols.driver_tx,
        driver_rx: raw.symbols.driver_rx,
        pci_write_indicators: raw.symbols.pci_write_indicators,
        msix_bar: raw.pci.msix_bar,
        to_device_bars: raw.pci.to_device_bars,
        interesting_network_devices: raw.network.interesting_devices.into_iter().collect(),
    };
    spanning.validate()?;

    let mut runtime = RuntimeConfig::default();
    if let Some(n) = raw.runtime.max_cpu_threads {
        runtime.max_cpu_threads = n;
    }
    if let Some(n) = raw.runtime.max_background_threads {
        runtime.max_background_threads = n;
    }
    if let Some(n) = raw.runtime.channel_capacity {
        runtime.channel_capacity = n;
    }

    Ok(CosimtraceConfig { spanning, runtime })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct TempToml(PathBuf);

    impl TempToml {
        fn new(name: &str, contents: &str) -> Self {
            let mut path = std::env::temp_dir();
            path.push(format!("cosimtrace-test-{name}-{}.toml", std::process::id()));
            std::fs::write(&path, contents).unwrap();
            Self(path)
        }
    }

    impl Drop for TempToml {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn rejects_empty_syscall_entry_set() {
        let file = TempToml::new(
            "empty-syscalls",
            r#"
            [network]
            interesting_devices = [[0, 0]]
            "#,
        );
        let result = load(&file.0);
        assert!(matches!(result, Err(TraceError::ConfigInvalid(_))));
    }

    #[test]
    fn loads_a_complete_config() {
        let file = TempToml::new(
            "complete",
            r#"
            [symbols]
            syscall_entry = ["sys_sendto", "sys_recvfrom"]
            kernel_tx = ["sys_sendto"]
            kernel_rx = ["sys_recvfrom"]

            [pci]
            msix_bar = 3
            to_device_bars = [0, 1]

            [network]
            interesting_devices = [[0, 0], [1, 0]]

            [runtime]
            max_background_threads = 4
            "#,
        );
        let config = load(&file.0).unwrap();
        assert!(config.spanning.is_syscall_entry("sys_sendto"));
        assert!(config.spanning.is_interesting_network_device(1, 0));
        assert_eq!(config.runtime.max_background_threads, 4);
    }
}
