//! End-to-end test of the pull-metrics endpoint through the public facade.

use otel_inst::{MetricsMode, OtiBuilder};

/// Builds a guard that keeps its hands off process-wide state so tests can
/// run in one binary.
fn isolated_builder(name: &str) -> OtiBuilder {
    OtiBuilder::new()
        .service_name(name)
        .without_global_install()
        .without_tracing_subscriber()
}

#[tokio::test(flavor = "multi_thread")]
async fn endpoint_mode_serves_recorded_metrics() {
    let mut oti = isolated_builder("endpoint-test")
        .metrics_mode(MetricsMode::Endpoint)
        .metrics_endpoint("127.0.0.1", 0)
        .build()
        .unwrap();

    let addr = oti.metrics_addr().expect("endpoint mode binds a listener");

    let meter = oti.meter("endpoint-test");
    let counter = meter.u64_counter("oti_smoke_requests").build();
    counter.add(3, &[]);

    let url = format!("http://{addr}/metrics");
    let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
    assert!(
        body.contains("oti_smoke_requests"),
        "exposition is missing the recorded counter: {body}"
    );

    oti.shutdown().unwrap();

    // After shutdown the listener is gone and repeated shutdown is a no-op.
    assert!(reqwest::get(&url).await.is_err());
    oti.shutdown().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn both_mode_also_binds_the_listener() {
    let mut oti = isolated_builder("both-test")
        .metrics_mode(MetricsMode::Both)
        .metrics_endpoint("127.0.0.1", 0)
        .build()
        .unwrap();

    let addr = oti.metrics_addr().expect("both mode binds a listener");
    let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert!(response.status().is_success());

    oti.shutdown().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn periodic_mode_has_no_listener() {
    let mut oti = isolated_builder("periodic-test").build().unwrap();
    assert!(oti.metrics_addr().is_none());
    oti.shutdown().unwrap();
}
