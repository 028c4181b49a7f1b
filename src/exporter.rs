//! Exporter and span-processor construction.
//!
//! The trace and metric exporters are built independently from the same
//! [`ExporterConfig`] fragment: same kind and URL, two separate instances,
//! never shared.

use crate::config::{ExporterKind, OtiConfig, SpanProcessorKind};
use crate::error::OtiError;
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig, WithTonicConfig};
use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader};
use opentelemetry_sdk::trace::{SpanExporter, TracerProviderBuilder};
use std::collections::HashMap;
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};

fn build_tonic_metadata(headers: &HashMap<String, String>) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (key, value) in headers {
        if let (Ok(k), Ok(v)) = (
            key.parse::<MetadataKey<_>>(),
            value.parse::<MetadataValue<_>>(),
        ) {
            metadata.insert(k, v);
        }
    }
    metadata
}

macro_rules! build_otlp_exporter {
    (grpc, $exporter_type:ident, $error_variant:ident, $config:expr, $timeout:expr) => {{
        let mut builder = opentelemetry_otlp::$exporter_type::builder()
            .with_tonic()
            .with_endpoint(&$config.url)
            .with_timeout($timeout);

        if !$config.headers.is_empty() {
            builder = builder.with_metadata(build_tonic_metadata(&$config.headers));
        }

        builder.build().map_err(OtiError::$error_variant)
    }};
    (http, $exporter_type:ident, $error_variant:ident, $config:expr, $timeout:expr) => {{
        let mut builder = opentelemetry_otlp::$exporter_type::builder()
            .with_http()
            .with_endpoint(&$config.url)
            .with_timeout($timeout);

        if !$config.headers.is_empty() {
            builder = builder.with_headers($config.headers.clone());
        }

        builder.build().map_err(OtiError::$error_variant)
    }};
}

/// Builds the span exporter for the configured transport and attaches it to
/// the tracer provider builder behind the configured span processor.
pub(crate) fn attach_span_pipeline(
    builder: TracerProviderBuilder,
    config: &OtiConfig,
) -> Result<TracerProviderBuilder, OtiError> {
    let exporter_config = &config.exporter;
    Ok(match exporter_config.kind {
        ExporterKind::Stdout => attach_processor(
            builder,
            config.span_processor,
            opentelemetry_stdout::SpanExporter::default(),
        ),
        ExporterKind::OtlpGrpc => attach_processor(
            builder,
            config.span_processor,
            build_otlp_exporter!(
                grpc,
                SpanExporter,
                TraceExporter,
                exporter_config,
                exporter_config.timeout
            )?,
        ),
        ExporterKind::OtlpHttp => attach_processor(
            builder,
            config.span_processor,
            build_otlp_exporter!(
                http,
                SpanExporter,
                TraceExporter,
                exporter_config,
                exporter_config.timeout
            )?,
        ),
    })
}

/// Wraps the span exporter in the configured processor.
///
/// `Simple` exports synchronously on every span completion; `Batch` hands
/// spans to the SDK's background batching thread, which drains on shutdown.
pub(crate) fn attach_processor<E: SpanExporter + 'static>(
    builder: TracerProviderBuilder,
    kind: SpanProcessorKind,
    exporter: E,
) -> TracerProviderBuilder {
    match kind {
        SpanProcessorKind::Simple => builder.with_simple_exporter(exporter),
        SpanProcessorKind::Batch => builder.with_batch_exporter(exporter),
    }
}

/// Builds the metric exporter for the configured transport and attaches a
/// timer-driven reader over it to the meter provider builder. The reader is
/// generic over its exporter, so each arm attaches inside the match. The
/// configured export timeout is carried on the exporter.
pub(crate) fn attach_periodic_reader(
    builder: MeterProviderBuilder,
    config: &OtiConfig,
) -> Result<MeterProviderBuilder, OtiError> {
    let exporter_config = &config.exporter;
    let interval = config.metrics.periodic.export_interval;
    let timeout = config.metrics.periodic.export_timeout;

    Ok(match exporter_config.kind {
        ExporterKind::Stdout => builder.with_reader(
            PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                .with_interval(interval)
                .build(),
        ),
        ExporterKind::OtlpGrpc => builder.with_reader(
            PeriodicReader::builder(build_otlp_exporter!(
                grpc,
                MetricExporter,
                MetricExporter,
                exporter_config,
                timeout
            )?)
            .with_interval(interval)
            .build(),
        ),
        ExporterKind::OtlpHttp => builder.with_reader(
            PeriodicReader::builder(build_otlp_exporter!(
                http,
                MetricExporter,
                MetricExporter,
                exporter_config,
                timeout
            )?)
            .with_interval(interval)
            .build(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SamplerKind, SamplingConfig};
    use crate::sampler::build_sampler;
    use opentelemetry::trace::{Tracer, TracerProvider};
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    fn provider_with(
        processor: SpanProcessorKind,
        sampler_kind: SamplerKind,
        exporter: InMemorySpanExporter,
    ) -> SdkTracerProvider {
        let sampler = build_sampler(&SamplingConfig {
            kind: sampler_kind,
            ratio: 1.0,
        });
        let builder = SdkTracerProvider::builder().with_sampler(sampler);
        attach_processor(builder, processor, exporter).build()
    }

    #[test]
    fn simple_processor_exports_one_span_per_completion() {
        let exporter = InMemorySpanExporter::default();
        let provider = provider_with(SpanProcessorKind::Simple, SamplerKind::AlwaysOn, exporter.clone());

        let tracer = provider.tracer("pipeline-test");
        tracer.in_span("x", |_| {});

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name.as_ref(), "x");

        provider.shutdown().unwrap();
    }

    #[test]
    fn always_off_sampler_exports_nothing() {
        let exporter = InMemorySpanExporter::default();
        let provider = provider_with(SpanProcessorKind::Simple, SamplerKind::AlwaysOff, exporter.clone());

        let tracer = provider.tracer("pipeline-test");
        tracer.in_span("dropped", |_| {});

        assert!(exporter.get_finished_spans().unwrap().is_empty());
        provider.shutdown().unwrap();
    }

    #[test]
    fn batch_processor_delivers_spans_after_flush() {
        let exporter = InMemorySpanExporter::default();
        let provider = provider_with(SpanProcessorKind::Batch, SamplerKind::AlwaysOn, exporter.clone());

        let tracer = provider.tracer("pipeline-test");
        tracer.in_span("batched", |_| {});

        provider.force_flush().unwrap();
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name.as_ref(), "batched");

        provider.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn periodic_reader_attaches_for_every_exporter_kind() {
        for kind in [
            ExporterKind::Stdout,
            ExporterKind::OtlpGrpc,
            ExporterKind::OtlpHttp,
        ] {
            let mut config = OtiConfig::default();
            config.exporter.kind = kind;

            let provider = attach_periodic_reader(SdkMeterProvider::builder(), &config)
                .unwrap()
                .build();
            // No collector is listening for the OTLP kinds; shutdown may
            // fail to export, which is fine.
            let _ = provider.shutdown();
        }
    }
}
