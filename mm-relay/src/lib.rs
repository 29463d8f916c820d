//! mm-relay library - MIDI CC fan-out relay
//!
//! Accepts client events over HTTP, keeps the last value per
//! (device, channel, cc) in memory and streams broadcasts to viewers over SSE.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod relay;
pub mod values;

pub use error::{ApiError, ApiResult};
pub use relay::Relay;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    /// When the relay started, for uptime reporting
    pub started: Instant,
}

impl AppState {
    /// Create new application state with the given per-subscriber buffer
    pub fn new(event_capacity: usize) -> Self {
        Self {
            relay: Arc::new(Relay::new(event_capacity)),
            started: Instant::now(),
        }
    }
}

/// Build application router
///
/// Viewer pages are served from other origins, so CORS is permissive.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/api/emit", post(api::emit))
        .route("/api/events", get(api::event_stream))
        .route("/api/values", get(api::get_values))
        .route("/api/values/:source_key", get(api::get_source_values))
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
