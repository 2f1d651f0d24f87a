//! Session assembly and the HTTP control API

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tessera_player::api::{create_router, AppState};
use tessera_player::config::Config;
use tessera_player::controller::Phase;
use tessera_player::sim::SimBehavior;
use tessera_player::Session;
use tower::ServiceExt;

const WALL_CONFIG: &str = r#"
[playback]
retry_delay_ms = 5
prefetch_lookahead = 0

[sync]
tick_interval_ms = 5

[[groups]]
name = "wall"
shared_clock = true

[[windows]]
id = "left"
group = "wall"
queue = [
    { locator = "https://cdn.example.com/a.mp4", display_title = "A" },
    { locator = "https://cdn.example.com/b.mp4" },
]

[[windows]]
id = "right"
group = "wall"
queue = [
    { locator = "https://cdn.example.com/a.mp4" },
    { locator = "https://cdn.example.com/b.mp4" },
]

[[windows]]
id = "solo"
"#;

fn start(harness: &Harness, toml: &str) -> Arc<Session> {
    let config = Config::from_toml(toml).unwrap();
    Arc::new(
        Session::start(
            config,
            harness.services(),
            &harness.factory,
            harness.events.clone(),
        )
        .unwrap(),
    )
}

fn router(session: &Arc<Session>) -> Router {
    create_router(AppState {
        session: session.clone(),
    })
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn post(app: &Router, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method("POST").uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_session_starts_shared_clock_group() {
    let harness = Harness::new(SimBehavior::auto(Duration::from_millis(1)));
    let session = start(&harness, WALL_CONFIG);

    let left = session.controller("left").unwrap();
    let right = session.controller("right").unwrap();
    wait_status(left, |s| s.phase == Phase::Playing).await;
    wait_status(right, |s| s.phase == Phase::Playing).await;
    wait_status(right, |s| s.volume == 0.0).await;

    let group = session.group("wall").unwrap();
    assert!(group.clock().unwrap().is_running());
    assert_eq!(group.status().index, Some(0));

    // Ungrouped window without a queue stays idle
    assert_eq!(session.controller("solo").unwrap().status().phase, Phase::Idle);

    session.shutdown().await;
}

#[tokio::test]
async fn test_session_rejects_invalid_config() {
    let harness = Harness::new(SimBehavior::manual());
    let mut config = Config::default();
    config.playback.halt_threshold = 0;

    let result = Session::start(
        config,
        harness.services(),
        &harness.factory,
        harness.events.clone(),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_shutdown_disposes_every_window() {
    let harness = Harness::new(SimBehavior::auto(Duration::from_millis(1)));
    let session = start(&harness, WALL_CONFIG);
    wait_status(session.controller("left").unwrap(), |s| s.phase == Phase::Playing).await;

    session.shutdown().await;
    for controller in session.controllers() {
        assert_eq!(controller.status().phase, Phase::Disposed);
    }
    // Second shutdown is harmless
    session.shutdown().await;
}

#[tokio::test]
async fn test_health_and_window_listing() {
    let harness = Harness::new(SimBehavior::auto(Duration::from_millis(1)));
    let session = start(&harness, WALL_CONFIG);
    let app = router(&session);

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["windows"], 3);
    assert_eq!(body["groups"], 1);

    let (status, body) = get(&app, "/windows").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, _) = get(&app, "/windows/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    wait_status(session.controller("left").unwrap(), |s| s.phase == Phase::Playing).await;
    let (status, body) = get(&app, "/windows/left").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "playing");
    assert_eq!(body["title"], "A");

    session.shutdown().await;
}

#[tokio::test]
async fn test_window_queue_and_volume_endpoints() {
    let harness = Harness::new(SimBehavior::auto(Duration::from_millis(1)));
    let session = start(&harness, WALL_CONFIG);
    let app = router(&session);
    let solo = session.controller("solo").unwrap();

    let (status, _) = post(
        &app,
        "/windows/solo/queue",
        Some(json!({ "items": [{ "locator": "https://cdn.example.com/solo.mp4" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let current = wait_status(solo, |s| s.phase == Phase::Playing).await;
    assert_eq!(current.locator.as_deref(), Some("https://cdn.example.com/solo.mp4"));

    let (status, _) = post(&app, "/windows/solo/volume", Some(json!({ "volume": 150 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/windows/solo/volume", Some(json!({ "volume": 50 }))).await;
    assert_eq!(status, StatusCode::OK);
    wait_status(solo, |s| s.volume == 0.5).await;

    let (status, _) = post(&app, "/windows/solo/seek", Some(json!({ "position_ms": -5 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/windows/solo/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    wait_status(solo, |s| s.phase == Phase::Paused).await;

    let (status, _) = post(&app, "/windows/solo/next", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&app, "/windows/solo/next", Some(json!({ "force": true }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(&app, "/windows/nobody/play", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    session.shutdown().await;
}

#[tokio::test]
async fn test_group_endpoints() {
    let harness = Harness::new(SimBehavior::auto(Duration::from_millis(1)));
    let session = start(&harness, WALL_CONFIG);
    let app = router(&session);
    let left = session.controller("left").unwrap();
    wait_status(left, |s| s.phase == Phase::Playing).await;

    let (status, body) = get(&app, "/groups/wall").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "wall");
    assert_eq!(body["members"].as_array().unwrap().len(), 2);

    let (status, _) = post(&app, "/groups/wall/speed", Some(json!({ "speed": -1.0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/groups/wall/speed", Some(json!({ "speed": 2.0 }))).await;
    assert_eq!(status, StatusCode::OK);
    wait_status(left, |s| s.speed == 2.0).await;

    let (status, _) = post(&app, "/groups/wall/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    wait_status(left, |s| s.phase == Phase::Paused).await;
    let (_, body) = get(&app, "/groups/wall").await;
    assert_eq!(body["held"], true);

    let (status, _) = post(&app, "/groups/wall/play", None).await;
    assert_eq!(status, StatusCode::OK);
    wait_status(left, |s| s.phase == Phase::Playing).await;

    let (status, _) = post(&app, "/groups/wall/next", None).await;
    assert_eq!(status, StatusCode::OK);
    wait_status(left, |s| s.phase == Phase::Playing && s.index == Some(1)).await;

    let (status, _) = get(&app, "/groups/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&app, "/groups").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    session.shutdown().await;
}
