//! Structured logging set-up (§7 A4). Installed once at process start; the
//! core and every module beneath it only ever call into `tracing`, never
//! into this module directly.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a `tracing-subscriber` formatting layer filtered by `RUST_LOG`,
/// defaulting to `info` when the variable is unset or invalid.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}
