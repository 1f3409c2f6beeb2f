//! Error taxonomy for the core engine.
//!
//! Data-path problems (malformed events, span state-machine rejections,
//! missing causal contexts) are loss-tolerant by design and are reported
//! through `tracing` rather than through `Result` — see the module docs on
//! [`crate::tracer`] and [`crate::spanner`]. `TraceError` is reserved for the
//! handful of failures a caller actually has to react to: export failures,
//! a poisoned channel propagating end-of-stream, and invalid configuration.

use std::time::Duration;
use thiserror::Error;

/// Specialized `Result` for the core engine.
pub type CoreResult<T> = Result<T, TraceError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The span exporter's background submission failed.
    #[error("span export failed: {0}")]
    ExportFailed(String),

    /// A batch of spans did not finish exporting within the configured timeout.
    #[error("exporting timed out after {:.3}s", .0.as_secs_f64())]
    ExportTimedOut(Duration),

    /// A span was marked done but its parent has not been registered with the
    /// tracer. This is a programming-error class failure: it should be
    /// impossible given the parent-before-child invariant, and only the
    /// offending span is skipped when it happens.
    #[error("span {span_id} references unknown parent {parent_id}")]
    MissingParent { span_id: u64, parent_id: u64 },

    /// A bounded channel was poisoned; propagated upward as end-of-stream.
    #[error("channel poisoned")]
    ChannelPoisoned,

    /// Configuration failed validation at start-up.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Catch-all for errors surfaced by a collaborator (e.g. the OTLP
    /// transport) that don't fit the categories above.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<String> for TraceError {
    fn from(msg: String) -> Self {
        TraceError::Other(msg.into())
    }
}

impl From<&'static str> for TraceError {
    fn from(msg: &'static str) -> Self {
        TraceError::Other(msg.into())
    }
}
