//! Background HTTP listener for the pull-metrics endpoint.
//!
//! Serves `GET /metrics` with the Prometheus text encoding of the registry
//! the pull reader writes into. The listener runs on a dedicated thread with
//! its own current-thread runtime so the facade stays synchronous.

use crate::error::OtiError;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{Encoder, Registry, TextEncoder};
use std::io;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread::JoinHandle;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Handle to the running pull-metrics listener.
#[derive(Debug)]
pub(crate) struct MetricServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MetricServer {
    /// Starts the listener on `{bind_address}:{port}`, non-blocking to the
    /// caller. Returns once the socket is bound; the actually-bound address
    /// (relevant for port 0) is available via [`addr`](Self::addr).
    pub(crate) fn start(
        registry: Registry,
        bind_address: &str,
        port: u16,
    ) -> Result<Self, OtiError> {
        let bind = format!("{bind_address}:{port}");
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread_bind = bind.clone();
        let thread = std::thread::Builder::new()
            .name("oti-metrics-endpoint".to_string())
            .spawn(move || serve(registry, thread_bind, ready_tx, shutdown_rx))
            .map_err(|source| OtiError::MetricServer {
                addr: bind.clone(),
                source,
            })?;

        match ready_rx.recv() {
            Ok(Ok(addr)) => Ok(Self {
                addr,
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            }),
            Ok(Err(source)) => {
                let _ = thread.join();
                Err(OtiError::MetricServer { addr: bind, source })
            }
            Err(_) => {
                let _ = thread.join();
                Err(OtiError::MetricServer {
                    addr: bind,
                    source: io::Error::other("metrics endpoint thread exited before binding"),
                })
            }
        }
    }

    /// The address the listener is bound to.
    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Gracefully shuts down the listener and blocks until its serving
    /// thread has terminated. No requests are served after this returns.
    /// Calling `stop` again is a no-op.
    pub(crate) fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!(target: "oti_lifecycle", "metrics endpoint thread panicked");
        }
    }
}

impl Drop for MetricServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(
    registry: Registry,
    bind: String,
    ready_tx: mpsc::Sender<Result<SocketAddr, io::Error>>,
    shutdown_rx: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match TcpListener::bind(bind.as_str()).await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        let router = Router::new()
            .route("/metrics", get(render_metrics))
            .with_state(registry);

        let _ = ready_tx.send(Ok(addr));
        tracing::debug!(target: "oti_lifecycle", %addr, "metrics endpoint listening");

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            tracing::error!(target: "oti_lifecycle", error = %e, "metrics endpoint server error");
        }
    });
}

async fn render_metrics(State(registry): State<Registry>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&registry.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
