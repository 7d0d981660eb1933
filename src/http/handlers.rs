use super::state::AppState;
use crate::recognition::EmittedEvent;
use crate::session::{RecognitionConfig, SessionSnapshot};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::{self, Stream};
use serde::Serialize;
use std::convert::Infallible;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub status: String,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn internal_error(context: &str, e: anyhow::Error) -> Response {
    error!("{}: {:#}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{}: {}", context, e),
        }),
    )
        .into_response()
}

async fn respond_with_snapshot(state: &AppState, status: &str) -> Response {
    match state.controller.snapshot().await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ControlResponse {
                status: status.to_string(),
                snapshot,
            }),
        )
            .into_response(),
        Err(e) => internal_error("Failed to read session state", e),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recognition/start
/// Start a session; a running session is torn down first
///
/// Failures to start are reported on the event stream, not as HTTP errors.
pub async fn start_recognition(
    State(state): State<AppState>,
    Json(config): Json<RecognitionConfig>,
) -> Response {
    info!("Start requested (lang={}, continuous={})", config.lang, config.continuous);

    if let Err(e) = state.controller.start(config).await {
        return internal_error("Failed to start recognition", e);
    }

    respond_with_snapshot(&state, "started").await
}

/// POST /recognition/stop
/// Stop gracefully; returns once the session has ended
pub async fn stop_recognition(State(state): State<AppState>) -> Response {
    info!("Stop requested");

    if let Err(e) = state.controller.stop().await {
        return internal_error("Failed to stop recognition", e);
    }

    respond_with_snapshot(&state, "stopped").await
}

/// POST /recognition/abort
pub async fn abort_recognition(State(state): State<AppState>) -> Response {
    info!("Abort requested");
    state.controller.abort();

    respond_with_snapshot(&state, "aborted").await
}

/// GET /recognition/state
pub async fn get_state(State(state): State<AppState>) -> Response {
    match state.controller.snapshot().await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => internal_error("Failed to read session state", e),
    }
}

/// GET /recognition/events
/// Server-sent events, one per emitted session event
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Event stream client connected");
    Sse::new(event_stream(state.events.subscribe())).keep_alive(KeepAlive::default())
}

fn event_stream(
    rx: broadcast::Receiver<EmittedEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(emitted) => {
                    let event = match Event::default().event(emitted.event.name()).json_data(&emitted) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Failed to encode event: {}", e);
                            continue;
                        }
                    };
                    return Some((Ok(event), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream client lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
