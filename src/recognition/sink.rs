use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use super::events::EmittedEvent;

/// Receives canonical session events in emission order
///
/// `emit` is called from the controller's loop and must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EmittedEvent);
}

impl EventSink for mpsc::UnboundedSender<EmittedEvent> {
    fn emit(&self, event: EmittedEvent) {
        if self.send(event).is_err() {
            debug!("Event listener dropped");
        }
    }
}

/// Fans events out to any number of listeners (HTTP clients, loggers)
///
/// Listeners that lag more than the channel capacity lose the oldest events.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<EmittedEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EmittedEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: EmittedEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

/// Sends every event to each inner sink in turn
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: EmittedEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
