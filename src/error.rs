//! Error types for configuration resolution and provider lifecycle.

use figment::Error as FigmentError;

/// Errors from configuration resolution, provider construction, and lifecycle.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OtiError {
    /// Failed to extract configuration from sources.
    #[error("configuration error: {0}")]
    Config(#[source] Box<FigmentError>),

    /// Exporter type string did not name a supported exporter.
    #[error("unsupported exporter type: {0:?}")]
    UnsupportedExporter(String),

    /// Sampler type string did not name a supported sampler.
    #[error("unsupported sampler type: {0:?}")]
    UnsupportedSampler(String),

    /// Span processor type string did not name a supported processor.
    #[error("unsupported span processor type: {0:?}")]
    UnsupportedProcessor(String),

    /// Metrics export mode string did not name a supported mode.
    #[error("unsupported metrics export mode: {0:?}")]
    UnsupportedMetricsMode(String),

    /// A configuration value was present but could not be used.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: &'static str,
        /// The rejected value, as provided.
        value: String,
    },

    /// Invalid exporter endpoint URL format.
    #[error("invalid exporter URL: {url} (must start with http:// or https://)")]
    InvalidEndpoint {
        /// The invalid URL that was provided.
        url: String,
    },

    /// Failed to create trace exporter.
    #[error("failed to create trace exporter")]
    TraceExporter(#[source] opentelemetry_otlp::ExporterBuildError),

    /// Failed to create metric exporter.
    #[error("failed to create metric exporter")]
    MetricExporter(#[source] opentelemetry_otlp::ExporterBuildError),

    /// Failed to create the Prometheus pull reader.
    #[error("failed to create prometheus metric reader")]
    PrometheusExporter(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Failed to start the metrics endpoint listener.
    #[error("failed to start metrics endpoint on {addr}")]
    MetricServer {
        /// The address the listener attempted to bind.
        addr: String,
        /// The underlying bind or spawn error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to initialise tracing subscriber.
    #[error("failed to initialise tracing subscriber")]
    TracingSubscriber(#[from] tracing_subscriber::util::TryInitError),

    /// Failed to flush providers.
    #[error("failed to flush providers")]
    Flush(#[source] opentelemetry_sdk::error::OTelSdkError),

    /// Failed to shut down providers.
    #[error("failed to shut down providers")]
    Shutdown(#[source] opentelemetry_sdk::error::OTelSdkError),
}
