pub mod audio;
pub mod config;
pub mod http;
pub mod nats;
pub mod recognition;
pub mod session;

pub use audio::{
    AudioCapture, AudioFile, AudioFormat, AudioFrame, AudioStreamSource, CaptureError,
    CaptureFactory, MicrophoneFactory, RecordingWriter,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use nats::{NatsBackend, NatsBackendFactory, NatsClient};
pub use recognition::{
    Alternative, BackendFactory, BroadcastSink, EmittedEvent, ErrorCode, ErrorEvent, EventSink,
    RecognitionBackend, RecognitionResult, SessionEvent,
};
pub use session::{
    AudioSourceConfig, ControllerOptions, RecognitionConfig, RecordingOptions, SessionController,
    SessionSnapshot, SessionState,
};
