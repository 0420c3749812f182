mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::Harness;
use sleep_timer::{api::create_router, services::ChannelBroadcaster, state::AppState};

fn router(h: &Harness) -> Router {
    let state = AppState::new(
        h.engine.clone(),
        Arc::new(ChannelBroadcaster::default()),
        20554,
        "127.0.0.1".to_string(),
    );
    create_router(Arc::new(state))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn start_then_status() {
    let h = Harness::new();
    let app = router(&h);

    let (status, body) = call(
        &app,
        Method::POST,
        "/timer/start",
        Some(json!({"durationSeconds": 90, "resourceId": "tab-a", "category": "video"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["resourceId"], "tab-a");
    assert_eq!(body["data"]["status"], "active");

    h.clock.advance_secs(30);
    let (_, body) = call(&app, Method::GET, "/timer/status", None).await;
    let timer = &body["data"]["timer"];
    assert_eq!(timer["active"], true);
    assert_eq!(timer["remainingSeconds"], 60);
    assert_eq!(timer["category"], "video");
    assert_eq!(body["data"]["lastAction"], "start");
    assert_eq!(body["data"]["port"], 20554);
}

#[tokio::test]
async fn errors_use_the_envelope() {
    let h = Harness::new();
    let app = router(&h);

    let (status, body) = call(
        &app,
        Method::POST,
        "/timer/start",
        Some(json!({"durationSeconds": 0, "resourceId": "tab-a"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INVALID_DURATION");
    assert!(body.get("data").is_none());

    let (_, body) = call(
        &app,
        Method::POST,
        "/timer/start",
        Some(json!({"durationSeconds": 10, "resourceId": "nowhere"})),
    )
    .await;
    assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");

    let (_, body) = call(&app, Method::POST, "/timer/pause", None).await;
    assert_eq!(body["error"]["code"], "NO_ACTIVE_TIMER");

    let (_, body) = call(
        &app,
        Method::POST,
        "/timer/extend",
        Some(json!({"additionalSeconds": 10})),
    )
    .await;
    assert_eq!(body["error"]["code"], "NO_ACTIVE_TIMER");
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let h = Harness::new();
    let app = router(&h);

    let (status, body) = call(
        &app,
        Method::POST,
        "/timer/start",
        Some(json!({"resourceId": "tab-a"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(h.repo.load_record().await.unwrap().is_none());
}

#[tokio::test]
async fn pause_resume_extend_stop() {
    let h = Harness::new();
    let app = router(&h);
    call(
        &app,
        Method::POST,
        "/timer/start",
        Some(json!({"durationSeconds": 60, "resourceId": "tab-b"})),
    )
    .await;

    h.clock.advance_secs(15);
    let (_, body) = call(&app, Method::POST, "/timer/pause", None).await;
    assert_eq!(body["data"]["status"], "paused");
    assert_eq!(body["data"]["remainingSeconds"], 45);

    let (_, body) = call(
        &app,
        Method::POST,
        "/timer/extend",
        Some(json!({"additionalSeconds": 15})),
    )
    .await;
    assert_eq!(body["data"]["remainingSeconds"], 60);

    let (_, body) = call(&app, Method::POST, "/timer/resume", None).await;
    assert_eq!(body["data"]["status"], "active");

    let (_, body) = call(&app, Method::POST, "/timer/stop", None).await;
    assert_eq!(body["success"], true);

    let (_, body) = call(&app, Method::GET, "/timer/status", None).await;
    assert_eq!(body["data"]["timer"], json!({"active": false}));
    assert_eq!(body["data"]["lastRun"]["outcome"], "stopped");
}

#[tokio::test]
async fn resume_without_timer_succeeds_empty() {
    let h = Harness::new();
    let app = router(&h);
    let (_, body) = call(&app, Method::POST, "/timer/resume", None).await;
    assert_eq!(body["success"], true);
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn health() {
    let h = Harness::new();
    let app = router(&h);
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
