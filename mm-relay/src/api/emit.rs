//! Event ingress

use axum::{body::Bytes, extract::State, http::StatusCode};

use crate::AppState;

/// POST /api/emit - submit one client event
///
/// Always answers 202: events are fire-and-forget and malformed bodies are
/// dropped without an error response.
pub async fn emit(State(state): State<AppState>, body: Bytes) -> StatusCode {
    state.relay.ingest(&body).await;
    StatusCode::ACCEPTED
}
