//! Builder for the instrumentation configuration.
//!
//! The builder supports layered configuration from multiple sources:
//! 1. Compiled defaults
//! 2. Configuration files (TOML)
//! 3. Documented `OTEL_*` environment variables
//! 4. Programmatic overrides
//!
//! Layering is fixed at resolution time: an explicit setter always wins over
//! an environment variable, and an environment variable always wins over a
//! default, regardless of the order the setters were called in.

use crate::config::{
    ExporterKind, MetricsMode, OtiConfig, SamplerKind, SpanProcessorKind,
};
use crate::error::OtiError;
use crate::guard::OtiGuard;
use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Environment variables read when the corresponding field has no explicit
/// value, mapped 1:1 onto configuration fields.
const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
const ENV_SERVICE_NAMESPACE: &str = "OTEL_SERVICE_NAMESPACE";
const ENV_SERVICE_VERSION: &str = "OTEL_SERVICE_VERSION";
const ENV_SPAN_PROCESSOR_TYPE: &str = "OTEL_SPAN_PROCESSOR_TYPE";
const ENV_EXPORTER_TYPE: &str = "OTEL_EXPORTER_TYPE";
const ENV_EXPORTER_URL: &str = "OTEL_EXPORTER_URL";
const ENV_TRACES_SAMPLER: &str = "OTEL_TRACES_SAMPLER";
const ENV_TRACES_SAMPLER_ARG: &str = "OTEL_TRACES_SAMPLER_ARG";

/// Builder for configuring and initialising the telemetry providers.
///
/// # Example
///
/// ```no_run
/// use otel_inst::{OtiBuilder, OtiError};
///
/// fn main() -> Result<(), OtiError> {
///     let mut oti = OtiBuilder::new()
///         .service_name("my-service")
///         .build()?;
///
///     let _tracer = oti.default_tracer();
///     // ... instrument the application ...
///
///     oti.shutdown()?;
///     Ok(())
/// }
/// ```
#[must_use = "builders do nothing unless .build() is called"]
pub struct OtiBuilder {
    files: Vec<PathBuf>,
    overrides: Figment,
}

impl OtiBuilder {
    /// Creates a new builder with no overrides.
    ///
    /// Without further configuration, `build()` resolves the documented
    /// defaults: stdout exporter, simple span processor, parent-based
    /// always-on sampling, periodic metrics export.
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            overrides: Figment::new(),
        }
    }

    /// Adds a TOML configuration file, layered above the defaults and below
    /// the environment variables. Missing files are silently skipped so
    /// optional configuration files can always be listed.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets the service name resource attribute.
    pub fn service_name(self, name: impl Into<String>) -> Self {
        self.merge("service_name", name.into())
    }

    /// Sets the service namespace resource attribute.
    pub fn service_namespace(self, namespace: impl Into<String>) -> Self {
        self.merge("service_namespace", namespace.into())
    }

    /// Sets the service instance id resource attribute.
    ///
    /// When unset, resolution generates `{service_name}_{random-uuid}` once.
    pub fn service_instance_id(self, instance_id: impl Into<String>) -> Self {
        self.merge("service_instance_id", instance_id.into())
    }

    /// Sets the service version resource attribute.
    pub fn service_version(self, version: impl Into<String>) -> Self {
        self.merge("service_version", version.into())
    }

    /// Sets the span processor strategy.
    pub fn span_processor(self, kind: SpanProcessorKind) -> Self {
        self.merge("span_processor", kind)
    }

    /// Sets the exporter transport, used by both the trace and the metric
    /// exporter.
    pub fn exporter_kind(self, kind: ExporterKind) -> Self {
        self.merge("exporter.kind", kind)
    }

    /// Sets the exporter target URL for the OTLP transports.
    pub fn exporter_url(self, url: impl Into<String>) -> Self {
        self.merge("exporter.url", url.into())
    }

    /// Sets the span export request timeout.
    pub fn exporter_timeout(self, timeout: Duration) -> Self {
        self.merge("exporter.timeout", format_millis(timeout))
    }

    /// Adds an HTTP header (gRPC metadata entry) to all export requests.
    pub fn header(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let header_key = format!("exporter.headers.{}", key.into());
        let value = value.into();
        Self {
            files: self.files,
            overrides: self.overrides.merge(Serialized::default(&header_key, value)),
        }
    }

    /// Sets the trace sampling strategy.
    pub fn sampler(self, kind: SamplerKind) -> Self {
        self.merge("sampling.kind", kind)
    }

    /// Sets the sampling ratio used by the ratio-based samplers.
    ///
    /// Values outside `[0.0, 1.0]` are rejected at resolution with
    /// [`OtiError::InvalidValue`].
    pub fn sampling_ratio(self, ratio: f64) -> Self {
        self.merge("sampling.ratio", ratio)
    }

    /// Sets which metric reader(s) the meter provider attaches.
    pub fn metrics_mode(self, mode: MetricsMode) -> Self {
        self.merge("metrics.mode", mode)
    }

    /// Sets the interval between periodic metric exports.
    pub fn metric_export_interval(self, interval: Duration) -> Self {
        self.merge("metrics.periodic.export_interval", format_millis(interval))
    }

    /// Sets the timeout for a single periodic metric export.
    pub fn metric_export_timeout(self, timeout: Duration) -> Self {
        self.merge("metrics.periodic.export_timeout", format_millis(timeout))
    }

    /// Sets the bind address and port of the pull-metrics listener.
    /// Port 0 requests an ephemeral port.
    pub fn metrics_endpoint(self, bind_address: impl Into<String>, port: u16) -> Self {
        self.merge("metrics.endpoint.bind_address", bind_address.into())
            .merge("metrics.endpoint.port", port)
    }

    /// Skips installing the providers as `opentelemetry::global` defaults.
    ///
    /// The guard's own handles keep working; only the ambient global lookup
    /// is left untouched.
    pub fn without_global_install(self) -> Self {
        self.merge("install_global", false)
    }

    /// Disables automatic tracing subscriber initialisation.
    ///
    /// By default the facade sets up a `tracing-subscriber` registry bridged
    /// into the constructed tracer provider. Disable this if the application
    /// configures its own subscriber.
    pub fn without_tracing_subscriber(self) -> Self {
        self.merge("init_tracing_subscriber", false)
    }

    /// Sets the instrumentation scope name. Defaults to the service name.
    pub fn instrumentation_scope_name(self, name: impl Into<String>) -> Self {
        self.merge("instrumentation_scope_name", name.into())
    }

    fn merge<T: serde::Serialize>(self, key: &str, value: T) -> Self {
        Self {
            files: self.files,
            overrides: self.overrides.merge(Serialized::default(key, value)),
        }
    }

    /// Resolves the configuration for inspection or debugging.
    ///
    /// This runs the full resolution: defaults, files, environment
    /// variables, programmatic overrides, validation, and the one-time
    /// instance-id generation.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction fails, an environment value does not
    /// parse, the sampling ratio is out of range, or an OTLP endpoint URL
    /// is malformed.
    pub fn extract_config(&self) -> Result<OtiConfig, OtiError> {
        let mut figment = Figment::from(Serialized::defaults(OtiConfig::default()));

        for path in &self.files {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = merge_documented_env(figment)?;
        figment = figment.merge(self.overrides.clone());

        let mut config: OtiConfig = figment
            .extract()
            .map_err(|e| OtiError::Config(Box::new(e)))?;
        finalize(&mut config)?;
        Ok(config)
    }

    /// Resolves the configuration and builds the telemetry providers.
    ///
    /// Returns an [`OtiGuard`] owning the providers (and the pull-metrics
    /// listener when configured). Construction either fully succeeds or
    /// fails with nothing installed process-wide.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration resolution fails, an exporter or
    /// reader cannot be built, the metrics listener cannot bind, or the
    /// tracing subscriber cannot be initialised.
    pub fn build(self) -> Result<OtiGuard, OtiError> {
        let config = self.extract_config()?;
        OtiGuard::from_config(config)
    }
}

impl Default for OtiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn format_millis(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}

/// Merges the documented environment variables, parsing enumerated and
/// numeric values eagerly so a bad value fails resolution instead of being
/// silently defaulted.
fn merge_documented_env(mut figment: Figment) -> Result<Figment, OtiError> {
    const STRING_VARS: &[(&str, &str)] = &[
        (ENV_SERVICE_NAME, "service_name"),
        (ENV_SERVICE_NAMESPACE, "service_namespace"),
        (ENV_SERVICE_VERSION, "service_version"),
        (ENV_EXPORTER_URL, "exporter.url"),
    ];

    for (var, key) in STRING_VARS {
        if let Ok(value) = std::env::var(var) {
            figment = figment.merge(Serialized::default(key, value));
        }
    }

    if let Ok(value) = std::env::var(ENV_SPAN_PROCESSOR_TYPE) {
        let kind: SpanProcessorKind = value.parse()?;
        figment = figment.merge(Serialized::default("span_processor", kind));
    }

    if let Ok(value) = std::env::var(ENV_EXPORTER_TYPE) {
        let kind: ExporterKind = value.parse()?;
        figment = figment.merge(Serialized::default("exporter.kind", kind));
    }

    if let Ok(value) = std::env::var(ENV_TRACES_SAMPLER) {
        let kind: SamplerKind = value.parse()?;
        figment = figment.merge(Serialized::default("sampling.kind", kind));
    }

    if let Ok(value) = std::env::var(ENV_TRACES_SAMPLER_ARG) {
        let ratio: f64 = value.parse().map_err(|_| OtiError::InvalidValue {
            field: "sampling.ratio",
            value: value.clone(),
        })?;
        figment = figment.merge(Serialized::default("sampling.ratio", ratio));
    }

    Ok(figment)
}

/// Post-extraction validation and the one non-deterministic resolution step.
fn finalize(config: &mut OtiConfig) -> Result<(), OtiError> {
    if !(0.0..=1.0).contains(&config.sampling.ratio) {
        return Err(OtiError::InvalidValue {
            field: "sampling.ratio",
            value: config.sampling.ratio.to_string(),
        });
    }

    if config.exporter.kind != ExporterKind::Stdout
        && !config.exporter.url.starts_with("http://")
        && !config.exporter.url.starts_with("https://")
    {
        return Err(OtiError::InvalidEndpoint {
            url: config.exporter.url.clone(),
        });
    }

    if config.service_instance_id.is_none() {
        config.service_instance_id = Some(format!("{}_{}", config.service_name, Uuid::new_v4()));
    }

    Ok(())
}
