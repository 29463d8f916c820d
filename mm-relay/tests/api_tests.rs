//! Integration tests for mm-relay API endpoints
//!
//! Tests cover:
//! - Health endpoint
//! - Event ingress (valid, malformed, out of range)
//! - Value table queries
//! - SSE stream: initial snapshot, broadcast delivery, origin suppression

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method

use mm_common::events::{ChannelUpdate, RelayEvent};
use mm_common::MidiChannel;
use mm_relay::{build_router, AppState};

/// Test helper: router plus a handle on its state
fn setup_app() -> (Router, AppState) {
    let state = AppState::new(64);
    (build_router(state.clone()), state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Test helper: next SSE frame as text
async fn next_frame(stream: &mut axum::body::BodyDataStream) -> String {
    let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("SSE frame should arrive")
        .expect("SSE stream should stay open")
        .expect("SSE chunk should be readable");
    String::from_utf8(chunk.to_vec()).expect("SSE frames are UTF-8")
}

// =============================================================================
// Health Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = setup_app();

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "mm-relay");
    assert!(body["version"].is_string());
    assert_eq!(body["subscribers"], 0);
    assert_eq!(body["values"], 0);
    assert!(body["uptime_secs"].is_u64());
}

#[tokio::test]
async fn test_health_reports_load() {
    let (app, state) = setup_app();
    let _viewer = state.relay.bus().subscribe();

    let event = json!({
        "type": "midi:client:message",
        "deviceName": "Korg 1",
        "channel": 3,
        "cc": 74,
        "value": 100
    });
    app.clone().oneshot(post_json("/api/emit", event)).await.unwrap();

    let response = app.oneshot(get("/health")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["subscribers"], 1);
    assert_eq!(body["values"], 1);
}

// =============================================================================
// Ingress Tests
// =============================================================================

#[tokio::test]
async fn test_emit_client_message_updates_values() {
    let (app, _) = setup_app();

    let event = json!({
        "type": "midi:client:message",
        "deviceName": "Korg 1",
        "channel": 3,
        "cc": 74,
        "value": 100
    });
    let response = app.clone().oneshot(post_json("/api/emit", event)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app.oneshot(get("/api/values")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let values = body["values"].as_array().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["deviceName"], "Korg 1");
    assert_eq!(values[0]["channel"], 3);
    assert_eq!(values[0]["cc"], 74);
    assert_eq!(values[0]["value"], 100);
}

#[tokio::test]
async fn test_emit_malformed_is_silently_accepted() {
    let (app, state) = setup_app();

    // Missing cc/value
    let missing = json!({"type": "midi:client:message", "deviceName": "Korg", "channel": 3});
    let response = app.clone().oneshot(post_json("/api/emit", missing)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Channel out of range
    let bad_channel = json!({"type": "midi:client:message", "deviceName": "Korg", "channel": 17, "cc": 1, "value": 1});
    let response = app.clone().oneshot(post_json("/api/emit", bad_channel)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Not JSON at all
    let request = Request::builder()
        .method("POST")
        .uri("/api/emit")
        .body(Body::from("garbage"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert!(state.relay.snapshot().await.values.is_empty());
}

#[tokio::test]
async fn test_source_values_lookup() {
    let (app, _) = setup_app();

    let event = json!({"type": "midi:client:message", "deviceName": "Roland", "channel": 2, "cc": 7, "value": 90});
    app.clone().oneshot(post_json("/api/emit", event)).await.unwrap();

    let response = app.clone().oneshot(get("/api/values/Roland_ch2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body[0]["value"], 90);

    let response = app.clone().oneshot(get("/api/values/Roland_ch5")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let response = app.oneshot(get("/api/values/Roland_ch99")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// SSE Tests
// =============================================================================

#[tokio::test]
async fn test_sse_sends_snapshot_then_updates() {
    let (app, state) = setup_app();

    let response = app.oneshot(get("/api/events?client_id=viewer")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut stream = response.into_body().into_data_stream();

    let first = next_frame(&mut stream).await;
    assert!(first.contains("event: midi:snapshot"), "got: {}", first);

    state
        .relay
        .ingest(br#"{"type":"midi:client:message","deviceName":"Korg 1","channel":3,"cc":74,"value":100}"#)
        .await;

    let second = next_frame(&mut stream).await;
    assert!(second.contains("event: midi:update"), "got: {}", second);
    assert!(second.contains("\"deviceName\":\"Korg 1\""));
}

#[tokio::test]
async fn test_sse_suppresses_own_channel_update() {
    let (app, state) = setup_app();

    let response = app.oneshot(get("/api/events?client_id=me")).await.unwrap();
    let mut stream = response.into_body().into_data_stream();
    next_frame(&mut stream).await; // snapshot

    let own = ChannelUpdate {
        device_name: "Korg".to_string(),
        channel: MidiChannel::new(4).unwrap(),
        client_id: Some("me".to_string()),
    };
    state.relay.handle(RelayEvent::ChannelUpdate(own)).await;

    let other = ChannelUpdate {
        device_name: "Roland".to_string(),
        channel: MidiChannel::new(5).unwrap(),
        client_id: Some("someone-else".to_string()),
    };
    state.relay.handle(RelayEvent::ChannelUpdate(other)).await;

    let frame = next_frame(&mut stream).await;
    assert!(frame.contains("event: midi:channel:updated"), "got: {}", frame);
    assert!(frame.contains("Roland"), "own update must be skipped, got: {}", frame);
}
