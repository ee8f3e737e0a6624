//! Integration tests for the hearth-audio HTTP API
//!
//! Tests the REST surface end to end over fake collaborators:
//! - Health and combined status
//! - Radio lifecycle and commands
//! - Player and queue control
//! - Error status mapping

mod helpers;

use axum::body::Body;
use axum::http::StatusCode;
use hearth_audio::api::{create_router, AppContext};
use helpers::TestHarness;
use http::{Method, Request};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Test helper to create a router over a fresh harness
fn setup_test_server() -> (axum::Router, TestHarness) {
    let harness = TestHarness::new();
    let router = create_router(AppContext {
        service: harness.service.clone(),
    });
    (router, harness)
}

/// Helper function to make HTTP requests to the test router
async fn make_request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => request
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

// ============================================================================
// Health / Status
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _h) = setup_test_server();

    let (status, body) = make_request(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "hearth-audio");
}

#[tokio::test]
async fn test_status_starts_idle() {
    let (app, _h) = setup_test_server();

    let (status, body) = make_request(&app, Method::GET, "/status", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_source"], "none");
    assert_eq!(body["radio"]["state"], "unknown");
    assert_eq!(body["player"]["loaded"], false);
    assert!(body["queue"]["on_deck"].is_null());
}

// ============================================================================
// Radio
// ============================================================================

#[tokio::test]
async fn test_radio_start_command_stop() {
    let (app, h) = setup_test_server();

    let (status, body) = make_request(&app, Method::POST, "/radio/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "spawned");

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/radio/command",
        Some(json!({"command": "select_station", "index": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "delivered");
    assert_eq!(body["command"], "select_station(3)");

    let (_, body) = make_request(&app, Method::GET, "/radio/status", None).await;
    assert_eq!(body["active_source"], "radio");
    assert_eq!(body["running"], true);

    let (status, body) = make_request(&app, Method::POST, "/radio/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "stopped");
    assert_eq!(body["step"], "graceful_quit");
    assert_eq!(h.processes.spawn_count(), 1);
}

#[tokio::test]
async fn test_radio_command_when_not_running() {
    let (app, h) = setup_test_server();

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/radio/command",
        Some(json!({"command": "next"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "not_running");
    assert!(h.pipe.commands().is_empty());
}

#[tokio::test]
async fn test_unknown_radio_command_is_rejected() {
    let (app, _h) = setup_test_server();

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/radio/command",
        Some(json!({"command": "self_destruct"})),
    )
    .await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_radio_event_hook() {
    let (app, h) = setup_test_server();
    make_request(&app, Method::POST, "/radio/start", None).await;

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/radio/event",
        Some(json!({"event": "songstart", "title": "So What", "artist": "Miles Davis"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let now_playing = h.service.radio().status().now_playing.unwrap();
    assert_eq!(now_playing.title, "So What");
}

// ============================================================================
// Player / Queue
// ============================================================================

#[tokio::test]
async fn test_play_local_and_queue() {
    let (app, h) = setup_test_server();
    let a = h.add_track("Artist - A");
    let b = h.add_track("Artist - B");

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/player/play-local",
        Some(json!({"path": a})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["track"]["title"], "A");

    let (status, body) =
        make_request(&app, Method::POST, "/queue", Some(json!({"path": b}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slot"], "on_deck");

    let (_, body) = make_request(&app, Method::GET, "/queue", None).await;
    assert_eq!(body["on_deck"]["title"], "B");

    let (status, body) = make_request(&app, Method::DELETE, "/queue/on_deck", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"]["title"], "B");

    let (_, body) = make_request(&app, Method::GET, "/player/status", None).await;
    assert_eq!(body["playing"], true);
}

#[tokio::test]
async fn test_queue_full_is_conflict() {
    let (app, h) = setup_test_server();
    for name in ["Artist - A", "Artist - B", "Artist - C"] {
        let path = h.add_track(name);
        make_request(&app, Method::POST, "/queue", Some(json!({"path": path}))).await;
    }

    let (_, body) = make_request(&app, Method::GET, "/queue", None).await;
    assert_eq!(body["on_deck"]["title"], "A");
    assert_eq!(body["in_the_hole"]["title"], "B");

    let path = "Artist - C.mp3";
    let (status, body) =
        make_request(&app, Method::POST, "/queue", Some(json!({"path": path}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["status"].as_str().unwrap().starts_with("error"));
}

#[tokio::test]
async fn test_invalid_queue_slot_is_bad_request() {
    let (app, _h) = setup_test_server();

    let (status, _) = make_request(&app, Method::DELETE, "/queue/bullpen", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_track_is_not_found() {
    let (app, _h) = setup_test_server();

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/player/play-local",
        Some(json!({"path": "nope.mp3"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pause_without_track_is_bad_request() {
    let (app, _h) = setup_test_server();

    let (status, _) = make_request(&app, Method::POST, "/player/pause", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_volume_out_of_range() {
    let (app, _h) = setup_test_server();

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/player/volume",
        Some(json!({"volume": 150})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/player/volume",
        Some(json!({"volume": 35})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["volume"], 35);
}

#[tokio::test]
async fn test_library_list_and_delete() {
    let (app, h) = setup_test_server();
    h.add_track("Artist - A");

    let (status, body) = make_request(&app, Method::GET, "/library", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tracks"].as_array().unwrap().len(), 1);

    let (status, _) = make_request(
        &app,
        Method::DELETE,
        "/library?path=Artist%20-%20A.mp3",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = make_request(&app, Method::GET, "/library", None).await;
    assert!(body["tracks"].as_array().unwrap().is_empty());
}

// ============================================================================
// SSE
// ============================================================================

#[tokio::test]
async fn test_event_stream_content_type() {
    let (app, _h) = setup_test_server();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/events?progress=true")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}
