//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Relay liveness plus fan-out load
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    /// Connected SSE viewers
    pub subscribers: usize,
    /// Recorded (device, channel, cc) values
    pub values: usize,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: "mm-relay",
        version: env!("CARGO_PKG_VERSION"),
        subscribers: state.relay.bus().subscriber_count(),
        values: state.relay.value_count().await,
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
