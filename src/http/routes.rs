use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/recognition/start", post(handlers::start_recognition))
        .route("/recognition/stop", post(handlers::stop_recognition))
        .route("/recognition/abort", post(handlers::abort_recognition))
        // Session queries
        .route("/recognition/state", get(handlers::get_state))
        .route("/recognition/events", get(handlers::stream_events))
        // Browser hosts call from another origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
