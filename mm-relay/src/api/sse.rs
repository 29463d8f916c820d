//! Server-Sent Events stream of relay broadcasts

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use mm_common::events::RelayEvent;
use mm_common::sse::{keep_alive, to_sse_event};

use crate::relay::delivers_to;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventStreamParams {
    /// Subscriber identity, used to suppress echoes of its own channel moves
    pub client_id: Option<String>,
}

/// GET /api/events - SSE event stream
///
/// Sends `midi:snapshot` first, then every `midi:update` and
/// `midi:channel:updated` broadcast.
pub async fn event_stream(
    State(state): State<AppState>,
    Query(params): Query<EventStreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before taking the snapshot so nothing falls in between
    let mut rx = state.relay.bus().subscribe();
    let snapshot = state.relay.snapshot().await;
    let client_id = params.client_id;

    info!(
        "New SSE client connected ({}), total subscribers: {}",
        client_id.as_deref().unwrap_or("anonymous"),
        state.relay.bus().subscriber_count()
    );

    let stream = async_stream::stream! {
        if let Some(frame) = to_sse_event(&RelayEvent::Snapshot(snapshot)) {
            yield Ok::<Event, Infallible>(frame);
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !delivers_to(&event, client_id.as_deref()) {
                        continue;
                    }
                    if let Some(frame) = to_sse_event(&event) {
                        yield Ok(frame);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Event bus closed, ending SSE stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}
