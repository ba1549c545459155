//! HTTP listeners supervised by the application.

use async_trait::async_trait;
use axum::{http::StatusCode, routing::get, Router};
use prometheus::{Registry, TextEncoder};
use queue_worker_core::Task;
use queue_worker_runtime::ShutdownSignal;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;

/// Serves an axum router on `0.0.0.0:<port>` until shutdown.
///
/// In-flight requests are allowed to complete once shutdown fires; new
/// connections are refused straight away.
pub struct HttpListener {
    router: Router,
    port: u16,
}

impl HttpListener {
    pub fn new(router: Router, port: u16) -> Self {
        Self { router, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl Task for HttpListener {
    async fn run(&self, shutdown: ShutdownSignal) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to address {}: {}", addr, e))?;

        info!(%addr, "HTTP listener started");

        let app = self.router.clone().layer(TraceLayer::new_for_http());
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.triggered().await })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server on {} failed: {}", addr, e))?;

        info!(%addr, "HTTP listener shutdown complete");
        Ok(())
    }
}

/// Router exposing `registry` in the Prometheus text format at `path`
pub fn prometheus_router(path: &str, registry: Registry) -> Router {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    Router::new().route(
        &path,
        get(move || {
            let registry = registry.clone();
            async move { metrics_endpoint(&registry) }
        }),
    )
}

fn metrics_endpoint(registry: &Registry) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    encoder
        .encode_to_string(&metric_families)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
