//! Trace reconstruction core for a heterogeneous hardware/network
//! co-simulation: assembles causally-linked spans from raw per-simulator
//! event streams and hands complete traces to an OpenTelemetry-compatible
//! exporter.
//!
//! The three load-bearing pieces are [`span`] (per-kind finite-state
//! machines gating event admission), [`spanner`] plus [`queues`] (the
//! cross-simulator causal context-passing protocol), and [`tracer`] (the
//! lazy parent-before-child exporter). This crate does not define log wire
//! formats or own exporter transport — see the `cosimtrace` binary crate
//! for the ambient CLI, config loading, and OTLP wiring built on top of it.

pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod export;
pub mod queues;
pub mod span;
pub mod spanner;
pub mod trace;
pub mod tracer;

pub use config::{RuntimeConfig, SpanningConfig};
pub use context::{Context, Expectation, SpanId, TraceContext, TraceId};
pub use error::{CoreResult, TraceError};
pub use event::{Event, EventKind, ParserId, Timestamp};
pub use export::SpanExporter;
pub use queues::ContextQueues;
pub use span::{Span, SpanKind};
pub use spanner::{HostSpanner, NicSpanner, NetworkSpanner};
pub use trace::Trace;
pub use tracer::Tracer;
