pub mod backend;
pub mod client;
pub mod messages;

pub use backend::{NatsBackend, NatsBackendFactory};
pub use client::NatsClient;
pub use messages::{AudioFrameMessage, ErrorMessage, TranscriptMessage};
