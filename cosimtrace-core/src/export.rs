//! Span export (C8, §4.7): the abstract sink the tracer hands
//! parent-before-child spans to, plus a concrete adapter onto the real
//! OpenTelemetry SDK and an in-memory exporter for tests.
//!
//! The core owns none of this transport — `SpanExporter` is the seam
//! described by §6: "the core does not own the exporter transport". A real
//! pipeline wires [`OtelSpanExporter`]; tests use [`InMemorySpanExporter`].

use crate::error::{CoreResult, TraceError};
use crate::event::EventKind;
use crate::span::Span;
use async_trait::async_trait;
use opentelemetry::trace::{Event as OtelEvent, SpanContext, SpanKind as OtelSpanKind, Tracer as OtelTracerTrait, TraceContextExt, TracerProvider as OtelTracerProviderTrait};
use opentelemetry::{Context as OtelContext, KeyValue};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

/// Receives spans one at a time, always after every ancestor of the span has
/// already been passed to `export` (the lazy parent-before-child invariant
/// the tracer maintains; see [`crate::tracer::Tracer`]).
#[async_trait]
pub trait SpanExporter: Send + Sync + 'static {
    async fn export(&self, span: Span) -> CoreResult<()>;
}

fn otel_kind_for(span: &Span) -> OtelSpanKind {
    use crate::span::SpanKind::*;
    match span.kind() {
        HostCall | HostInt => OtelSpanKind::Internal,
        HostMmio | HostDma | HostPci | NicMmio | NicDma => OtelSpanKind::Client,
        HostMsix | NicMsix => OtelSpanKind::Consumer,
        NicEth => OtelSpanKind::Producer,
        NetDevice => OtelSpanKind::Internal,
        Generic => OtelSpanKind::Internal,
    }
}

fn timestamp_to_systemtime(ts: u64) -> std::time::SystemTime {
    UNIX_EPOCH + Duration::from_nanos(ts)
}

/// Attributes carried by one raw event's payload (§4.7: "one OpenTelemetry
/// event per raw event in the span"). Also used to seed the exported span's
/// own kind-specific attributes from its first raw event.
fn event_attributes(kind: &EventKind) -> Vec<KeyValue> {
    match kind {
        EventKind::HostInstr { pc } => vec![KeyValue::new("cosimtrace.pc", *pc as i64)],
        EventKind::HostCall { pc, func, component } => vec![
            KeyValue::new("cosimtrace.pc", *pc as i64),
            KeyValue::new("cosimtrace.func", func.clone()),
            KeyValue::new("cosimtrace.component", component.clone()),
        ],
        EventKind::HostPostInt | EventKind::HostClearInt => vec![],
        EventKind::HostMmioR { id, addr, size, bar, offset } => vec![
            KeyValue::new("cosimtrace.id", *id as i64),
            KeyValue::new("cosimtrace.addr", *addr as i64),
            KeyValue::new("cosimtrace.size", *size as i64),
            KeyValue::new("cosimtrace.bar", *bar as i64),
            KeyValue::new("cosimtrace.offset", *offset as i64),
        ],
        EventKind::HostMmioW { id, addr, size, bar, offset, posted } => vec![
            KeyValue::new("cosimtrace.id", *id as i64),
            KeyValue::new("cosimtrace.addr", *addr as i64),
            KeyValue::new("cosimtrace.size", *size as i64),
            KeyValue::new("cosimtrace.bar", *bar as i64),
            KeyValue::new("cosimtrace.offset", *offset as i64),
            KeyValue::new("cosimtrace.posted", *posted),
        ],
        EventKind::HostMmioImRespPoW => vec![],
        EventKind::HostMmioCR { id } | EventKind::HostMmioCW { id } => {
            vec![KeyValue::new("cosimtrace.id", *id as i64)]
        }
        EventKind::HostPciRW { offset, size, is_read } => vec![
            KeyValue::new("cosimtrace.offset", *offset as i64),
            KeyValue::new("cosimtrace.size", *size as i64),
            KeyValue::new("cosimtrace.is_read", *is_read),
        ],
        EventKind::HostConf { dev, func, reg, bytes, data, is_read } => vec![
            KeyValue::new("cosimtrace.dev", *dev as i64),
            KeyValue::new("cosimtrace.func", *func as i64),
            KeyValue::new("cosimtrace.reg", *reg as i64),
            KeyValue::new("cosimtrace.bytes", *bytes as i64),
            KeyValue::new("cosimtrace.data", *data as i64),
            KeyValue::new("cosimtrace.is_read", *is_read),
        ],
        EventKind::HostDmaR { id, addr, size } | EventKind::HostDmaW { id, addr, size } => vec![
            KeyValue::new("cosimtrace.id", *id as i64),
            KeyValue::new("cosimtrace.addr", *addr as i64),
            KeyValue::new("cosimtrace.size", *size as i64),
        ],
        EventKind::HostDmaC { id } => vec![KeyValue::new("cosimtrace.id", *id as i64)],
        EventKind::HostMsiX { vec } => vec![KeyValue::new("cosimtrace.vec", *vec as i64)],
        EventKind::NicMmioR { off, len, val } => vec![
            KeyValue::new("cosimtrace.off", *off as i64),
            KeyValue::new("cosimtrace.len", *len as i64),
            KeyValue::new("cosimtrace.val", *val as i64),
        ],
        EventKind::NicMmioW { off, len, val, posted } => vec![
            KeyValue::new("cosimtrace.off", *off as i64),
            KeyValue::new("cosimtrace.len", *len as i64),
            KeyValue::new("cosimtrace.val", *val as i64),
            KeyValue::new("cosimtrace.posted", *posted),
        ],
        EventKind::NicDmaI { id, addr, len }
        | EventKind::NicDmaEx { id, addr, len }
        | EventKind::NicDmaCR { id, addr, len }
        | EventKind::NicDmaCW { id, addr, len } => vec![
            KeyValue::new("cosimtrace.id", *id as i64),
            KeyValue::new("cosimtrace.addr", *addr as i64),
            KeyValue::new("cosimtrace.len", *len as i64),
        ],
        EventKind::NicTx { len } => vec![KeyValue::new("cosimtrace.len", *len as i64)],
        EventKind::NicRx { port, len } => vec![
            KeyValue::new("cosimtrace.port", *port as i64),
            KeyValue::new("cosimtrace.len", *len as i64),
        ],
        EventKind::NicMsix { vec, is_x } => vec![
            KeyValue::new("cosimtrace.vec", *vec as i64),
            KeyValue::new("cosimtrace.is_x", *is_x),
        ],
        EventKind::SetIx { intr } => vec![KeyValue::new("cosimtrace.intr", *intr as i64)],
        EventKind::NetworkEnqueue(data) | EventKind::NetworkDequeue(data) | EventKind::NetworkDrop(data) => vec![
            KeyValue::new("cosimtrace.node", data.node as i64),
            KeyValue::new("cosimtrace.device", data.device as i64),
            KeyValue::new("cosimtrace.device_kind", data.device_kind.clone()),
            KeyValue::new("cosimtrace.payload_size", data.payload_size as i64),
        ],
    }
}

/// Bridges the core's [`Span`] model onto a real `opentelemetry_sdk` tracer
/// provider, tracking the [`SpanContext`] each exported span was assigned so
/// children can be built as genuine OpenTelemetry children rather than only
/// sharing a `trace_id`.
pub struct OtelSpanExporter {
    provider: SdkTracerProvider,
    contexts: Mutex<HashMap<u64, SpanContext>>,
}

impl OtelSpanExporter {
    pub fn new(provider: SdkTracerProvider) -> Self {
        Self { provider, contexts: Mutex::new(HashMap::new()) }
    }

    fn parent_context(&self, span: &Span) -> Option<OtelContext> {
        let parent = span.parent()?;
        let contexts = self.contexts.lock().unwrap();
        let parent_ctx = contexts.get(&parent.id())?.clone();
        Some(OtelContext::new().with_remote_span_context(parent_ctx))
    }
}

#[async_trait]
impl SpanExporter for OtelSpanExporter {
    async fn export(&self, span: Span) -> CoreResult<()> {
        let tracer = self.provider.tracer("cosimtrace");
        let start = span
            .start_ts()
            .map(timestamp_to_systemtime)
            .unwrap_or_else(std::time::SystemTime::now);
        let end = span
            .end_ts()
            .map(timestamp_to_systemtime)
            .unwrap_or(start);

        let raw_events = span.events();

        // The first raw event carries the identifying payload for this span's
        // kind (e.g. an mmio id/bar, a dma id/addr) — fold it into the span's
        // own attributes on top of the generic bookkeeping fields.
        let mut attributes = vec![
            KeyValue::new("cosimtrace.span_id", span.id() as i64),
            KeyValue::new("cosimtrace.source_id", span.source_id() as i64),
            KeyValue::new("cosimtrace.event_count", span.event_count() as i64),
        ];
        if let Some(first) = raw_events.first() {
            attributes.extend(event_attributes(&first.kind));
        }

        let otel_events: Vec<OtelEvent> = raw_events
            .iter()
            .map(|event| {
                OtelEvent::new(
                    event.kind.name().to_string(),
                    timestamp_to_systemtime(event.timestamp),
                    event_attributes(&event.kind),
                    0,
                )
            })
            .collect();

        let builder = tracer
            .span_builder(span.kind().name().to_string())
            .with_kind(otel_kind_for(&span))
            .with_start_time(start)
            .with_end_time(end)
            .with_attributes(attributes)
            .with_events(otel_events);

        let otel_span = match self.parent_context(&span) {
            Some(parent_cx) => tracer.build_with_context(builder, &parent_cx),
            None => tracer.build(builder),
        };

        let span_context = opentelemetry::trace::Span::span_context(&otel_span).clone();
        self.contexts.lock().unwrap().insert(span.id(), span_context);
        Ok(())
    }
}

/// Records exported spans in memory, in export order, for assertions in
/// tests that don't need the real OTel pipeline (§8 "Test tooling").
#[derive(Clone, Default)]
pub struct InMemorySpanExporter {
    exported: Arc<Mutex<Vec<Span>>>,
}

impl InMemorySpanExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exported_spans(&self) -> Vec<Span> {
        self.exported.lock().unwrap().clone()
    }

    pub fn exported_ids(&self) -> Vec<u64> {
        self.exported.lock().unwrap().iter().map(|s| s.id()).collect()
    }

    pub fn clear(&self) {
        self.exported.lock().unwrap().clear();
    }
}

#[async_trait]
impl SpanExporter for InMemorySpanExporter {
    async fn export(&self, span: Span) -> CoreResult<()> {
        self.exported.lock().unwrap().push(span);
        Ok(())
    }
}

/// An exporter that always fails, for exercising the tracer's error-logging
/// path without a real collector (§7 "Export failures").
pub struct FailingSpanExporter;

#[async_trait]
impl SpanExporter for FailingSpanExporter {
    async fn export(&self, _span: Span) -> CoreResult<()> {
        Err(TraceError::ExportFailed("simulated export failure".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpanningConfig;
    use crate::context::TraceContext;
    use crate::event::{Event, EventKind};
    use crate::span::GenericSpan;
    use std::sync::Mutex as StdMutex;

    fn generic_span(id: u64) -> Span {
        let cfg = SpanningConfig::default();
        let concrete = GenericSpan::start(
            id,
            1,
            TraceContext::trace_starting(1),
            Event::new(0, 1, "host", EventKind::HostInstr { pc: 0 }),
            &cfg,
        )
        .unwrap();
        Span::Generic(Arc::new(StdMutex::new(concrete)))
    }

    #[tokio::test]
    async fn in_memory_exporter_records_export_order() {
        let exporter = InMemorySpanExporter::new();
        exporter.export(generic_span(1)).await.unwrap();
        exporter.export(generic_span(2)).await.unwrap();
        assert_eq!(exporter.exported_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn failing_exporter_reports_export_failed() {
        let exporter = FailingSpanExporter;
        let err = exporter.export(generic_span(1)).await.unwrap_err();
        assert!(matches!(err, TraceError::ExportFailed(_)));
    }
}
