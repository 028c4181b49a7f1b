//! Configuration types for the instrumentation layer.
//!
//! These types are designed to be deserialised from multiple sources using
//! figment, supporting layered configuration from defaults, files, and
//! environment variables. The enumerated options are closed tagged types:
//! an unrecognised string fails at the parse boundary with the matching
//! [`OtiError`] variant instead of being silently defaulted.

use crate::error::OtiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Service name used when neither an explicit value nor `OTEL_SERVICE_NAME`
/// is present.
pub const DEFAULT_SERVICE_NAME: &str = "UNDEFINED_SERVICE";
/// Default service namespace.
pub const DEFAULT_SERVICE_NAMESPACE: &str = "UNDEFINED_SERVICE_NS";
/// Default service version.
pub const DEFAULT_SERVICE_VERSION: &str = "UNDEFINED_SERVICE_VERSION";
/// Default exporter target, a local OTLP collector address.
pub const DEFAULT_EXPORTER_URL: &str = "http://localhost:4317";

/// Span exporter transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExporterKind {
    /// Console/text exporter; the configured URL is ignored.
    #[default]
    Stdout,
    /// OTLP over gRPC (plaintext channel for `http://` endpoints).
    OtlpGrpc,
    /// OTLP over HTTP.
    OtlpHttp,
}

impl ExporterKind {
    /// Canonical option name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExporterKind::Stdout => "STDOUT",
            ExporterKind::OtlpGrpc => "OTLPGRPC",
            ExporterKind::OtlpHttp => "OTLPHTTP",
        }
    }
}

impl FromStr for ExporterKind {
    type Err = OtiError;

    fn from_str(s: &str) -> Result<Self, OtiError> {
        match s.to_ascii_uppercase().as_str() {
            "STDOUT" => Ok(ExporterKind::Stdout),
            "OTLPGRPC" => Ok(ExporterKind::OtlpGrpc),
            "OTLPHTTP" => Ok(ExporterKind::OtlpHttp),
            _ => Err(OtiError::UnsupportedExporter(s.to_string())),
        }
    }
}

/// Trace sampling strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SamplerKind {
    /// Never sample.
    AlwaysOff,
    /// Always sample.
    AlwaysOn,
    /// Respect the parent's decision; sample root spans.
    #[default]
    ParentBasedAlwaysOn,
    /// Respect the parent's decision; drop root spans.
    ParentBasedAlwaysOff,
    /// Respect the parent's decision; sample root spans with the configured
    /// ratio, decided deterministically from the trace id.
    ParentBasedTraceIdRatio,
    /// Sample with the configured ratio from the trace id, ignoring any
    /// parent decision.
    TraceIdRatio,
}

impl SamplerKind {
    /// Canonical option name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplerKind::AlwaysOff => "ALWAYS_OFF",
            SamplerKind::AlwaysOn => "ALWAYS_ON",
            SamplerKind::ParentBasedAlwaysOn => "PARENTBASED_ALWAYS_ON",
            SamplerKind::ParentBasedAlwaysOff => "PARENTBASED_ALWAYS_OFF",
            SamplerKind::ParentBasedTraceIdRatio => "PARENTBASED_TRACEID_RATIO",
            SamplerKind::TraceIdRatio => "TRACEIDRATIO",
        }
    }
}

impl FromStr for SamplerKind {
    type Err = OtiError;

    fn from_str(s: &str) -> Result<Self, OtiError> {
        match s.to_ascii_uppercase().as_str() {
            "ALWAYS_OFF" => Ok(SamplerKind::AlwaysOff),
            "ALWAYS_ON" => Ok(SamplerKind::AlwaysOn),
            "PARENTBASED_ALWAYS_ON" => Ok(SamplerKind::ParentBasedAlwaysOn),
            "PARENTBASED_ALWAYS_OFF" => Ok(SamplerKind::ParentBasedAlwaysOff),
            "PARENTBASED_TRACEID_RATIO" | "PARENTBASED_TRACEIDRATIO" => {
                Ok(SamplerKind::ParentBasedTraceIdRatio)
            }
            "TRACEIDRATIO" | "TRACEID_RATIO" => Ok(SamplerKind::TraceIdRatio),
            _ => Err(OtiError::UnsupportedSampler(s.to_string())),
        }
    }
}

/// Span processor strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SpanProcessorKind {
    /// Synchronous one-span-at-a-time export on every span completion.
    #[default]
    Simple,
    /// Asynchronous batched export on a timer/size threshold. Spans may be
    /// lost if the process terminates before shutdown drains the queue.
    Batch,
}

impl SpanProcessorKind {
    /// Canonical option name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanProcessorKind::Simple => "SIMPLE",
            SpanProcessorKind::Batch => "BATCH",
        }
    }
}

impl FromStr for SpanProcessorKind {
    type Err = OtiError;

    fn from_str(s: &str) -> Result<Self, OtiError> {
        match s.to_ascii_uppercase().as_str() {
            "SIMPLE" => Ok(SpanProcessorKind::Simple),
            "BATCH" => Ok(SpanProcessorKind::Batch),
            _ => Err(OtiError::UnsupportedProcessor(s.to_string())),
        }
    }
}

/// Which metric reader(s) the meter provider attaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricsMode {
    /// One timer-driven reader pushing to the metric exporter.
    #[default]
    Periodic,
    /// One pull-based reader exposed over a local HTTP listener.
    Endpoint,
    /// Both readers attached; the pull listener is started.
    Both,
}

impl MetricsMode {
    /// Canonical option name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricsMode::Periodic => "PERIODIC",
            MetricsMode::Endpoint => "ENDPOINT",
            MetricsMode::Both => "BOTH",
        }
    }

    /// Whether this mode attaches the timer-driven reader.
    #[must_use]
    pub fn attaches_periodic_reader(&self) -> bool {
        matches!(self, MetricsMode::Periodic | MetricsMode::Both)
    }

    /// Whether this mode attaches the pull reader and starts its listener.
    #[must_use]
    pub fn attaches_pull_endpoint(&self) -> bool {
        matches!(self, MetricsMode::Endpoint | MetricsMode::Both)
    }
}

impl FromStr for MetricsMode {
    type Err = OtiError;

    fn from_str(s: &str) -> Result<Self, OtiError> {
        match s.to_ascii_uppercase().as_str() {
            "PERIODIC" => Ok(MetricsMode::Periodic),
            "ENDPOINT" => Ok(MetricsMode::Endpoint),
            "BOTH" => Ok(MetricsMode::Both),
            _ => Err(OtiError::UnsupportedMetricsMode(s.to_string())),
        }
    }
}

macro_rules! string_repr {
    ($($kind:ty),+ $(,)?) => {$(
        impl TryFrom<String> for $kind {
            type Error = OtiError;

            fn try_from(s: String) -> Result<Self, OtiError> {
                s.parse()
            }
        }

        impl From<$kind> for String {
            fn from(kind: $kind) -> String {
                kind.as_str().to_string()
            }
        }

        impl fmt::Display for $kind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    )+};
}

string_repr!(ExporterKind, SamplerKind, SpanProcessorKind, MetricsMode);

/// Complete configuration snapshot.
///
/// After [`OtiBuilder::extract_config`](crate::OtiBuilder::extract_config)
/// every field holds a concrete value; `service_instance_id` is the only
/// field filled during resolution (explicit value, or
/// `{service_name}_{uuid}` drawn once).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtiConfig {
    /// Service name resource attribute.
    pub service_name: String,

    /// Service namespace resource attribute.
    pub service_namespace: String,

    /// Service instance id resource attribute. `None` until resolution.
    pub service_instance_id: Option<String>,

    /// Service version resource attribute.
    pub service_version: String,

    /// Span processor strategy.
    pub span_processor: SpanProcessorKind,

    /// Exporter configuration, shared by the trace and metric exporters.
    pub exporter: ExporterConfig,

    /// Trace sampling configuration.
    pub sampling: SamplingConfig,

    /// Metrics export configuration.
    pub metrics: MetricsConfig,

    /// Whether to install the providers as process-wide defaults.
    ///
    /// The global registry is last-write-wins shared state; only one active
    /// facade per process should install into it.
    pub install_global: bool,

    /// Whether to initialise the tracing subscriber.
    pub init_tracing_subscriber: bool,

    /// Name for the instrumentation scope. Defaults to `service_name`.
    pub instrumentation_scope_name: Option<String>,
}

impl Default for OtiConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_namespace: DEFAULT_SERVICE_NAMESPACE.to_string(),
            service_instance_id: None,
            service_version: DEFAULT_SERVICE_VERSION.to_string(),
            span_processor: SpanProcessorKind::default(),
            exporter: ExporterConfig::default(),
            sampling: SamplingConfig::default(),
            metrics: MetricsConfig::default(),
            install_global: true,
            init_tracing_subscriber: true,
            instrumentation_scope_name: None,
        }
    }
}

/// Exporter configuration.
///
/// Evaluated independently for the trace and metric exporters: same kind and
/// URL, two separate exporter instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Exporter transport.
    pub kind: ExporterKind,

    /// Target URL for the OTLP transports. Ignored by [`ExporterKind::Stdout`].
    pub url: String,

    /// Request timeout for span export.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// HTTP headers / gRPC metadata for authentication or customisation.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            kind: ExporterKind::default(),
            url: DEFAULT_EXPORTER_URL.to_string(),
            timeout: Duration::from_secs(10),
            headers: HashMap::new(),
        }
    }
}

/// Trace sampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Sampling strategy.
    pub kind: SamplerKind,

    /// Sampling probability in `[0.0, 1.0]`, used by the ratio-based kinds.
    pub ratio: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            kind: SamplerKind::default(),
            ratio: 1.0,
        }
    }
}

/// Metrics export configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Which reader(s) to attach.
    pub mode: MetricsMode,

    /// Timer-driven reader settings (modes `PERIODIC` and `BOTH`).
    pub periodic: PeriodicReaderConfig,

    /// Pull endpoint settings (modes `ENDPOINT` and `BOTH`).
    pub endpoint: MetricsEndpointConfig,
}

/// Periodic metric reader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodicReaderConfig {
    /// Interval between exports.
    #[serde(with = "humantime_serde")]
    pub export_interval: Duration,

    /// Maximum time for a single export call, carried on the metric exporter.
    #[serde(with = "humantime_serde")]
    pub export_timeout: Duration,
}

impl Default for PeriodicReaderConfig {
    fn default() -> Self {
        Self {
            export_interval: Duration::from_secs(60),
            export_timeout: Duration::from_secs(30),
        }
    }
}

/// Pull-metrics endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsEndpointConfig {
    /// Address the listener binds.
    pub bind_address: String,

    /// Port the listener binds. Port 0 requests an ephemeral port.
    pub port: u16,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9464,
        }
    }
}
