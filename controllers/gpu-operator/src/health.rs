//! Health, readiness and metrics endpoints.

use crate::metrics::Metrics;
use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state of the health server
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Operator metrics
    pub metrics: Arc<Metrics>,
    /// Set once the first reconciliation pass has completed
    pub synced: Arc<AtomicBool>,
}

/// Router serving `/healthz`, `/readyz` and `/metrics`
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub(crate) async fn readyz(State(state): State<HealthState>) -> impl IntoResponse {
    if state.synced.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "waiting for first reconciliation")
    }
}

pub(crate) async fn metrics(State(state): State<HealthState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("cannot encode metrics: {}", e)),
    }
}

/// Serve the health endpoints until the listener fails
pub async fn serve(addr: SocketAddr, state: HealthState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind health server to {}", addr))?;
    info!("Health server listening on {}", addr);
    axum::serve(listener, router(state)).await.context("health server stopped")
}
