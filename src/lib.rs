//! One-call OpenTelemetry instrumentation bootstrap.
//!
//! This crate wires up the OpenTelemetry tracing and metrics pipelines from
//! a single layered configuration: compiled defaults, optional TOML files,
//! the documented `OTEL_*` environment variables, and programmatic builder
//! overrides, in ascending precedence.
//!
//! The entry point is [`OtiBuilder`]. A successful [`OtiBuilder::build`]
//! returns an [`OtiGuard`] that owns every constructed component: the tracer
//! provider, the meter provider, and (when a pull endpoint is configured)
//! the Prometheus-format HTTP listener. Construction is all or nothing; on
//! any failure no provider is installed process-wide. Dropping or shutting
//! down the guard flushes and tears everything down in reverse order.
//!
//! ```no_run
//! use otel_inst::{OtiBuilder, OtiError, SamplerKind};
//! use otel_inst::opentelemetry::trace::Tracer;
//!
//! fn main() -> Result<(), OtiError> {
//!     let mut oti = OtiBuilder::new()
//!         .service_name("checkout")
//!         .service_version("1.4.2")
//!         .sampler(SamplerKind::ParentBasedTraceIdRatio)
//!         .sampling_ratio(0.1)
//!         .build()?;
//!
//!     let tracer = oti.default_tracer();
//!     tracer.in_span("handle-request", |_cx| {
//!         // application work
//!     });
//!
//!     oti.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! Exporters, samplers, and span processors are selected by closed
//! enumerations ([`ExporterKind`], [`SamplerKind`], [`SpanProcessorKind`]);
//! every variant parses case-insensitively from configuration strings and
//! unknown names fail resolution with the offending string preserved.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
mod error;
mod exporter;
mod guard;
mod metrics_server;
mod sampler;

pub use builder::OtiBuilder;
pub use config::{
    DEFAULT_EXPORTER_URL, DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_NAMESPACE,
    DEFAULT_SERVICE_VERSION, ExporterConfig, ExporterKind, MetricsConfig, MetricsEndpointConfig,
    MetricsMode, OtiConfig, PeriodicReaderConfig, SamplerKind, SamplingConfig, SpanProcessorKind,
};
pub use error::OtiError;
pub use guard::OtiGuard;

// Re-exported so downstream crates can use the exact API versions this
// crate was built against.
pub use figment;
pub use opentelemetry;
pub use opentelemetry_sdk;
pub use tracing;
