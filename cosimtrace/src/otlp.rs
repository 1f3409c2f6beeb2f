//! OTLP exporter pipeline wiring (§6 A3, §4.7). Builds the real
//! `opentelemetry_sdk` tracer provider the core's [`OtelSpanExporter`] sits
//! on top of. The core itself has no opinion on transport; this is the only
//! place gRPC/tonic details are allowed to leak in.

use cosimtrace_core::error::{CoreResult, TraceError};
use cosimtrace_core::export::OtelSpanExporter;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;

/// Builds an [`OtelSpanExporter`] backed by a batch OTLP/gRPC pipeline
/// pointed at `endpoint`.
pub fn build_exporter(endpoint: &str) -> CoreResult<OtelSpanExporter> {
    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TraceError::Other(Box::new(e)))?;

    let provider = SdkTracerProvider::builder().with_batch_exporter(span_exporter).build();

    Ok(OtelSpanExporter::new(provider))
}
