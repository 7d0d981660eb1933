use tokio::sync::mpsc;
use tracing::debug;

use crate::audio::{AudioFrame, CaptureError};
use crate::session::Command;
use crate::session::RecognitionConfig;

/// What a backend can do beyond the basic start/feed/cancel contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `finish()` makes the engine deliver a best-effort final result
    pub graceful_finish: bool,
    /// The engine reads audio URIs itself instead of being fed frames
    pub reads_uri: bool,
}

/// How audio reaches the backend for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendInput {
    /// Frames arrive through `feed()`
    Stream { sample_rate: u32, channels: u16 },
    /// The engine opens the asset itself
    Uri(String),
}

/// Everything a backend needs to begin recognizing
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub session_id: String,
    pub config: RecognitionConfig,
    pub input: BackendInput,
}

/// A segment of an on-device transcription
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub substring: String,
    /// 0.0 means the engine did not score this segment
    pub confidence: f32,
}

/// One ranked transcription from an on-device engine
#[derive(Debug, Clone, PartialEq)]
pub struct RawTranscription {
    pub formatted: String,
    pub segments: Vec<RawSegment>,
}

/// Result shapes as backends produce them
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// On-device streaming engine: transcriptions ranked best first
    Ranked(Vec<RawTranscription>),
    /// Network engine: one transcript per message
    Transcript { text: String, confidence: Option<f32> },
}

/// Error shapes as backends produce them
#[derive(Debug, Clone)]
pub enum RawError {
    /// Numeric code from an on-device engine
    Engine { code: i64, message: String },
    /// String code reported by a network recognition service
    Service { code: String, message: String },
    /// Connection or messaging failure talking to the engine
    Transport(String),
    /// Audio source failure
    Capture(CaptureError),
    /// The engine did not respond in time
    Timeout(String),
}

impl From<CaptureError> for RawError {
    fn from(err: CaptureError) -> Self {
        RawError::Capture(err)
    }
}

/// Raw callbacks a backend reports during a session
#[derive(Debug, Clone)]
pub enum RawCallback {
    /// The engine heard audio energy
    SoundActivity,
    /// Interim hypothesis
    Partial(RawResult),
    /// Final hypothesis for the current utterance
    Final(RawResult),
    Error(RawError),
    /// The engine finished and will send nothing more
    Completed,
}

/// Handle a backend uses to report callbacks to the session controller
///
/// Every callback is tagged with the session it belongs to; callbacks that
/// arrive after that session ended are discarded by the controller.
#[derive(Clone)]
pub struct BackendEvents {
    tx: mpsc::UnboundedSender<Command>,
    generation: u64,
}

impl BackendEvents {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>, generation: u64) -> Self {
        Self { tx, generation }
    }

    /// Report a callback; returns false once the controller has shut down
    pub fn emit(&self, callback: RawCallback) -> bool {
        let sent = self
            .tx
            .send(Command::Backend {
                generation: self.generation,
                callback,
            })
            .is_ok();
        if !sent {
            debug!("Dropping backend callback, controller is gone");
        }
        sent
    }

    pub fn partial(&self, result: RawResult) -> bool {
        self.emit(RawCallback::Partial(result))
    }

    pub fn final_result(&self, result: RawResult) -> bool {
        self.emit(RawCallback::Final(result))
    }

    pub fn error(&self, error: RawError) -> bool {
        self.emit(RawCallback::Error(error))
    }

    pub fn completed(&self) -> bool {
        self.emit(RawCallback::Completed)
    }
}

/// Recognition engine capability
///
/// Implementations:
/// - NATS: network speech-to-text service fed with PCM frames
/// - On-device engines are plugged in by the host through this same trait
#[async_trait::async_trait]
pub trait RecognitionBackend: Send {
    /// Backend name for logging
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Begin recognizing; resolves once the engine is ready for audio
    async fn start(&mut self, request: RecognitionRequest, events: BackendEvents) -> Result<(), RawError>;

    /// Deliver one audio frame
    async fn feed(&mut self, frame: &AudioFrame) -> Result<(), RawError>;

    /// Ask for a best-effort final result; only called when `graceful_finish` is set
    async fn finish(&mut self) -> Result<(), RawError>;

    /// Release the engine immediately; must be safe to call more than once
    async fn cancel(&mut self);
}

/// Builds a backend bound to one session's configuration
pub trait BackendFactory: Send + Sync {
    fn create(&self, config: &RecognitionConfig) -> Result<Box<dyn RecognitionBackend>, RawError>;
}
