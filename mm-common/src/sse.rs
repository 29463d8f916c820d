//! Server-Sent Events (SSE) utilities
//!
//! Conversion of [`RelayEvent`]s into SSE frames. The SSE `event:` field
//! carries the wire name (`midi:update`, ...) and `data:` the JSON object.

use axum::response::sse::{Event, KeepAlive};
use std::time::Duration;
use tracing::warn;

use crate::events::RelayEvent;

/// Keep-alive interval for SSE connections
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Convert a relay event into an SSE frame
///
/// Returns `None` (and logs) if the event cannot be serialized.
pub fn to_sse_event(event: &RelayEvent) -> Option<Event> {
    match Event::default().event(event.event_type()).json_data(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Failed to serialize {} for SSE: {}", event.event_type(), e);
            None
        }
    }
}

/// Standard keep-alive used by every SSE endpoint
pub fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("keep-alive")
}
