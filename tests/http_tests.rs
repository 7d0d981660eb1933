// Router tests for the HTTP bridge

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{MockEngine, MockMicrophone};
use loqa_speech::recognition::BroadcastSink;
use loqa_speech::session::SessionController;
use loqa_speech::{create_router, AppState};
use serde_json::Value;
use tower::ServiceExt;

fn app(engine: &MockEngine) -> Result<(axum::Router, BroadcastSink)> {
    let events = BroadcastSink::new(64);
    let (controller, _handle) = SessionController::builder()
        .backends(engine.clone())
        .captures(MockMicrophone::silent())
        .spawn(events.clone())?;

    Ok((create_router(AppState::new(controller, events.clone())), events))
}

async fn json_body(response: axum::response::Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let (router, _) = app(&MockEngine::new())?;

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_state_when_idle() -> Result<()> {
    let (router, _) = app(&MockEngine::new())?;

    let response = router
        .oneshot(Request::builder().uri("/recognition/state").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await?;
    assert_eq!(body["state"], "inactive");
    assert_eq!(body["sessions_completed"], 0);
    Ok(())
}

#[tokio::test]
async fn test_start_then_abort() -> Result<()> {
    let engine = MockEngine::new();
    let (router, events) = app(&engine)?;
    let mut rx = events.subscribe();

    let response = router
        .clone()
        .oneshot(post("/recognition/start", r#"{"lang": "de-DE", "interimResults": true}"#))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["status"], "started");
    assert_eq!(body["snapshot"]["state"], "recognizing");
    assert_eq!(body["snapshot"]["source"], "microphone");

    let request = engine.last_request();
    assert_eq!(request.config.lang, "de-DE");
    assert!(request.config.interim_results);

    let response = router.oneshot(post("/recognition/abort", "")).await?;
    let body = json_body(response).await?;
    assert_eq!(body["snapshot"]["state"], "inactive");

    let mut seen = Vec::new();
    loop {
        let event = rx.recv().await?;
        seen.push(event.event.name());
        if event.event.name() == "end" {
            break;
        }
    }
    assert_eq!(seen, vec!["start", "audiostart", "audioend", "end"]);
    Ok(())
}

#[tokio::test]
async fn test_stop_waits_for_final_result() -> Result<()> {
    let engine = MockEngine::new().finishing_with("all done");
    let (router, _) = app(&engine)?;

    router.clone().oneshot(post("/recognition/start", "{}")).await?;
    let response = router.oneshot(post("/recognition/stop", "")).await?;

    let body = json_body(response).await?;
    assert_eq!(body["status"], "stopped");
    assert_eq!(body["snapshot"]["state"], "inactive");
    assert_eq!(body["snapshot"]["sessions_completed"], 1);
    Ok(())
}

#[tokio::test]
async fn test_start_rejects_malformed_config() -> Result<()> {
    let (router, _) = app(&MockEngine::new())?;

    let response = router
        .oneshot(post("/recognition/start", r#"{"maxAlternatives": "many"}"#))
        .await?;
    assert!(response.status().is_client_error());
    Ok(())
}

#[tokio::test]
async fn test_events_endpoint_is_sse() -> Result<()> {
    let (router, _) = app(&MockEngine::new())?;

    let response = router
        .oneshot(Request::builder().uri("/recognition/events").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str()?,
        "text/event-stream"
    );
    Ok(())
}
