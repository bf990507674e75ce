//! # HTTP Server
//!
//! HTTP server for metrics, health checks, and Kubernetes probes.
//!
//! Provides endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (200 once the listener is bound, 503 after shutdown starts)
//!
//! The server runs on port 5000 by default (configurable via `METRICS_PORT`).

use crate::observability::metrics;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug, Default)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
}

impl ServerState {
    pub fn mark_ready(&self) {
        self.is_ready.store(true, Ordering::Relaxed);
    }

    pub fn mark_not_ready(&self) {
        self.is_ready.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }
}

#[must_use]
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Bind `0.0.0.0:port`, mark the state ready and serve until the process exits
///
/// # Errors
///
/// Bind and serve failures.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let app = router(Arc::clone(&state));

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);
    state.mark_ready();

    axum::serve(listener, app).await?;

    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {e}"),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_readyz_follows_state() {
        let state = Arc::new(ServerState::default());
        let response = readyz_handler(State(Arc::clone(&state))).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.mark_ready();
        let response = readyz_handler(State(Arc::clone(&state))).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_healthz_is_always_ok() {
        assert_eq!(healthz_handler().await.into_response().status(), StatusCode::OK);
    }
}
