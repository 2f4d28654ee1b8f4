//! HTTP surface
//!
//! - `POST /v1/domains/{domain}/projects/{project}/topics/{topic}/publish`
//! - `GET /health`, `GET /ready`, `GET /metrics`
//!
//! The publish route captures everything under `/v1/domains/` so that short
//! paths reach the relay and are answered with 400 rather than 404. The
//! captured remainder is percent-decoded before it is split into segments.

use crate::relay::Relay;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub broker: &'static str,
    pub audit_enabled: bool,
}

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
}

/// Build the full router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(DOMAINS_PREFIX, post(publish_root_handler))
        .route("/v1/domains/{*rest}", post(publish_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

const DOMAINS_PREFIX: &str = "/v1/domains/";

/// Publish endpoint - body is taken raw so the path is checked first
async fn publish_handler(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    body: Bytes,
) -> Response {
    publish(&state, &format!("{DOMAINS_PREFIX}{rest}"), body).await
}

/// Bare `/v1/domains/`; always rejected as too short by the relay
async fn publish_root_handler(State(state): State<AppState>, body: Bytes) -> Response {
    publish(&state, DOMAINS_PREFIX, body).await
}

async fn publish(state: &AppState, path: &str, body: Bytes) -> Response {
    match state.relay.handle(path, body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness endpoint - clients are built per request, so there is no
/// standing connection to check
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(ReadyResponse {
        ready: true,
        broker: state.relay.broker_kind(),
        audit_enabled: state.relay.audit_enabled(),
    })
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.relay.metrics().render(),
    )
}
