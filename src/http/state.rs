use crate::recognition::BroadcastSink;
use crate::session::SessionController;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the controller that owns the recognition session
    pub controller: SessionController,

    /// Sink the controller emits into; each SSE client subscribes to it
    pub events: BroadcastSink,
}

impl AppState {
    pub fn new(controller: SessionController, events: BroadcastSink) -> Self {
        Self { controller, events }
    }
}
