//! HTTP bridge between a host application and the session controller
//!
//! - POST /recognition/start - Start a session (JSON recognition config)
//! - POST /recognition/stop - Stop gracefully and wait for `end`
//! - POST /recognition/abort - Cancel immediately
//! - GET /recognition/state - Controller snapshot
//! - GET /recognition/events - Server-sent session events
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
