//! Provider assembly and facade lifecycle.
//!
//! [`OtiGuard`] owns one tracer provider and one meter provider (and the
//! pull-metrics listener when the metrics mode asks for one) for its
//! lifetime. Construction is all-or-nothing: providers, listener, and the
//! optional tracing subscriber are fully built before anything is installed
//! as a process-wide default, so a failed build leaves no global state
//! behind.

use crate::config::OtiConfig;
use crate::error::OtiError;
use crate::exporter;
use crate::metrics_server::MetricServer;
use crate::sampler::build_sampler;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global, metrics::Meter, metrics::MeterProvider as _};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use std::borrow::Cow;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Facade over the configured telemetry providers.
///
/// Obtain via [`OtiBuilder::build`](crate::OtiBuilder::build). Call
/// [`shutdown`](Self::shutdown) before process exit so buffered spans and
/// metrics are drained; `Drop` performs the same teardown as a fallback,
/// logging errors instead of returning them.
///
/// When `install_global` is left enabled the providers are also registered
/// as `opentelemetry::global` defaults. That registry is last-write-wins:
/// constructing a second guard in the same process silently replaces the
/// first one's registration.
pub struct OtiGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    metric_server: Option<MetricServer>,
    scope_name: String,
    shut_down: bool,
}

impl OtiGuard {
    /// Builds providers from a resolved configuration and installs the
    /// process-wide defaults if configured to.
    pub(crate) fn from_config(config: OtiConfig) -> Result<Self, OtiError> {
        let resource = build_resource(&config);
        let tracer_provider = build_tracer_provider(&config, resource.clone())?;
        let (meter_provider, metric_server) = build_meter_provider(&config, resource)?;

        let scope_name = config
            .instrumentation_scope_name
            .clone()
            .unwrap_or_else(|| config.service_name.clone());

        let mut guard = Self {
            tracer_provider,
            meter_provider,
            metric_server,
            scope_name,
            shut_down: false,
        };

        if config.init_tracing_subscriber
            && let Err(e) = init_subscriber(&guard.tracer_provider, guard.scope_name.clone())
        {
            let _ = guard.shutdown();
            return Err(e);
        }

        if config.install_global {
            global::set_tracer_provider(guard.tracer_provider.clone());
            global::set_meter_provider(guard.meter_provider.clone());

            let propagator = TextMapCompositePropagator::new(vec![
                Box::new(TraceContextPropagator::new()),
                Box::new(BaggagePropagator::new()),
            ]);
            global::set_text_map_propagator(propagator);
        }

        Ok(guard)
    }

    /// Returns a tracer from the owned provider.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> SdkTracer {
        self.tracer_provider.tracer(name)
    }

    /// Returns a tracer named after the instrumentation scope.
    pub fn default_tracer(&self) -> SdkTracer {
        self.tracer_provider.tracer(self.scope_name.clone())
    }

    /// Returns a meter from the owned provider.
    pub fn meter(&self, name: &'static str) -> Meter {
        self.meter_provider.meter(name)
    }

    /// The tracer provider owned by this guard.
    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    /// The meter provider owned by this guard.
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    /// Bound address of the pull-metrics listener, if one was started.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metric_server.as_ref().map(MetricServer::addr)
    }

    /// Flushes both providers. Errors are logged but not returned.
    pub fn flush(&self) {
        if let Err(e) = self.tracer_provider.force_flush() {
            tracing::error!(target: "oti_lifecycle", error = %e, "failed to flush tracer provider");
        }
        if let Err(e) = self.meter_provider.force_flush() {
            tracing::error!(target: "oti_lifecycle", error = %e, "failed to flush meter provider");
        }
    }

    /// Shuts down in reverse construction order: metric listener first, then
    /// the meter provider, then the tracer provider, each flushed before it
    /// is closed. Every step runs even when an earlier one errors, so a
    /// failing flush cannot strand a later provider; the first error is
    /// returned. Idempotent: a second call is an `Ok(())` no-op.
    pub fn shutdown(&mut self) -> Result<(), OtiError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        if let Some(server) = self.metric_server.as_mut() {
            server.stop();
        }

        let mut first_error = None;

        if let Err(e) = self.meter_provider.force_flush() {
            first_error.get_or_insert(OtiError::Flush(e));
        }
        if let Err(e) = self.meter_provider.shutdown() {
            first_error.get_or_insert(OtiError::Shutdown(e));
        }
        if let Err(e) = self.tracer_provider.force_flush() {
            first_error.get_or_insert(OtiError::Flush(e));
        }
        if let Err(e) = self.tracer_provider.shutdown() {
            first_error.get_or_insert(OtiError::Shutdown(e));
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for OtiGuard {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Some(server) = self.metric_server.as_mut() {
            server.stop();
        }

        let _ = self.meter_provider.force_flush();
        if let Err(e) = self.meter_provider.shutdown() {
            tracing::error!(target: "oti_lifecycle", error = %e, "failed to shut down meter provider");
        }

        let _ = self.tracer_provider.force_flush();
        if let Err(e) = self.tracer_provider.shutdown() {
            tracing::error!(target: "oti_lifecycle", error = %e, "failed to shut down tracer provider");
        }
    }
}

fn build_resource(config: &OtiConfig) -> Resource {
    let mut attributes = vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.namespace", config.service_namespace.clone()),
        KeyValue::new("service.version", config.service_version.clone()),
    ];
    if let Some(instance_id) = &config.service_instance_id {
        attributes.push(KeyValue::new("service.instance.id", instance_id.clone()));
    }
    Resource::builder().with_attributes(attributes).build()
}

fn build_tracer_provider(
    config: &OtiConfig,
    resource: Resource,
) -> Result<SdkTracerProvider, OtiError> {
    let builder = SdkTracerProvider::builder()
        .with_sampler(build_sampler(&config.sampling))
        .with_resource(resource);
    Ok(exporter::attach_span_pipeline(builder, config)?.build())
}

fn build_meter_provider(
    config: &OtiConfig,
    resource: Resource,
) -> Result<(SdkMeterProvider, Option<MetricServer>), OtiError> {
    let mode = config.metrics.mode;
    let mut builder = SdkMeterProvider::builder().with_resource(resource);

    if mode.attaches_periodic_reader() {
        builder = exporter::attach_periodic_reader(builder, config)?;
    }

    let metric_server = if mode.attaches_pull_endpoint() {
        let registry = prometheus::Registry::new();
        let reader = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| OtiError::PrometheusExporter(Box::new(e)))?;
        builder = builder.with_reader(reader);
        Some(MetricServer::start(
            registry,
            &config.metrics.endpoint.bind_address,
            config.metrics.endpoint.port,
        )?)
    } else {
        None
    };

    Ok((builder.build(), metric_server))
}

fn init_subscriber(tracer_provider: &SdkTracerProvider, scope_name: String) -> Result<(), OtiError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let tracer = tracer_provider.tracer(scope_name);
    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(telemetry_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExporterKind, MetricsMode};

    fn endpoint_config(mode: MetricsMode) -> OtiConfig {
        let mut config = OtiConfig::default();
        config.metrics.mode = mode;
        config.metrics.endpoint.bind_address = "127.0.0.1".to_string();
        config.metrics.endpoint.port = 0;
        config
    }

    fn attribute(resource: &Resource, key: &str) -> Option<String> {
        resource
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.to_string())
    }

    #[test]
    fn resource_carries_the_four_service_identity_attributes() {
        let mut config = OtiConfig::default();
        config.service_name = "checkout".to_string();
        config.service_namespace = "shop".to_string();
        config.service_instance_id = Some("checkout_1".to_string());
        config.service_version = "2.1.0".to_string();

        let resource = build_resource(&config);
        assert_eq!(attribute(&resource, "service.name").as_deref(), Some("checkout"));
        assert_eq!(attribute(&resource, "service.namespace").as_deref(), Some("shop"));
        assert_eq!(
            attribute(&resource, "service.instance.id").as_deref(),
            Some("checkout_1")
        );
        assert_eq!(attribute(&resource, "service.version").as_deref(), Some("2.1.0"));
    }

    #[test]
    fn periodic_mode_starts_no_listener() {
        let (provider, server) =
            build_meter_provider(&endpoint_config(MetricsMode::Periodic), Resource::builder().build())
                .unwrap();
        assert!(server.is_none());
        provider.shutdown().unwrap();
    }

    #[test]
    fn endpoint_mode_starts_the_listener() {
        let (provider, server) =
            build_meter_provider(&endpoint_config(MetricsMode::Endpoint), Resource::builder().build())
                .unwrap();
        let mut server = server.expect("endpoint mode must start the listener");
        assert_ne!(server.addr().port(), 0);
        server.stop();
        provider.shutdown().unwrap();
    }

    #[test]
    fn both_mode_starts_the_listener_and_periodic_reader() {
        let (provider, server) =
            build_meter_provider(&endpoint_config(MetricsMode::Both), Resource::builder().build())
                .unwrap();
        assert!(server.is_some());
        drop(server);
        provider.shutdown().unwrap();
    }

    #[test]
    fn stdout_tracer_provider_builds() {
        let config = OtiConfig::default();
        let provider = build_tracer_provider(&config, build_resource(&config)).unwrap();
        provider.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_meter_flush_still_tears_down_the_tracer_provider() {
        let mut config = OtiConfig::default();
        config.exporter.kind = ExporterKind::OtlpGrpc;
        config.exporter.url = "http://127.0.0.1:1".to_string();
        config.install_global = false;
        config.init_tracing_subscriber = false;

        let mut guard = OtiGuard::from_config(config).unwrap();
        let counter = guard.meter("teardown-test").u64_counter("teardown_total").build();
        counter.add(1, &[]);

        // Nothing listens on port 1, so flushing the recorded metric errors.
        assert!(guard.shutdown().is_err());
        assert!(guard.shutdown().is_ok(), "second shutdown is a no-op");

        // The tracer provider must have been shut down despite the meter
        // error, so shutting it down again reports it as already closed.
        assert!(guard.tracer_provider().shutdown().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn otlp_grpc_tracer_provider_builds() {
        let mut config = OtiConfig::default();
        config.exporter.kind = ExporterKind::OtlpGrpc;
        let provider = build_tracer_provider(&config, build_resource(&config)).unwrap();
        // No collector is listening; shutdown may fail to export, which is fine.
        let _ = provider.shutdown();
    }
}
