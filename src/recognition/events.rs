use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Canonical error taxonomy shared by every recognition backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    BadGrammar,
    LanguageNotSupported,
    Client,
    Busy,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoSpeech => "no-speech",
            ErrorCode::Aborted => "aborted",
            ErrorCode::AudioCapture => "audio-capture",
            ErrorCode::Network => "network",
            ErrorCode::NotAllowed => "not-allowed",
            ErrorCode::ServiceNotAllowed => "service-not-allowed",
            ErrorCode::BadGrammar => "bad-grammar",
            ErrorCode::LanguageNotSupported => "language-not-supported",
            ErrorCode::Client => "client",
            ErrorCode::Busy => "busy",
            ErrorCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload delivered with an `error` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// One transcription hypothesis
///
/// `confidence` is `None` when the engine gave no score. On the wire that is
/// written as `-1`, which must not be read as a low score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    #[serde(
        serialize_with = "serialize_confidence",
        deserialize_with = "deserialize_confidence"
    )]
    pub confidence: Option<f32>,
}

impl Alternative {
    pub fn new(transcript: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            transcript: transcript.into(),
            confidence: confidence.map(|c| c.clamp(0.0, 1.0)),
        }
    }
}

fn serialize_confidence<S: Serializer>(value: &Option<f32>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f32(value.unwrap_or(-1.0))
}

fn deserialize_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f32>, D::Error> {
    let raw = Option::<f32>::deserialize(deserializer)?;
    Ok(raw.filter(|c| *c >= 0.0))
}

/// Normalized recognition result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub is_final: bool,
    /// Alternatives in engine order, best first
    pub results: Vec<Alternative>,
}

impl RecognitionResult {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Best transcript, if any
    pub fn transcript(&self) -> Option<&str> {
        self.results.first().map(|a| a.transcript.as_str())
    }
}

/// Events emitted by a recognition session, in the browser SpeechRecognition vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionEvent {
    Start,
    AudioStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    SoundStart,
    SpeechStart,
    Result(RecognitionResult),
    NoMatch,
    Error(ErrorEvent),
    SpeechEnd,
    SoundEnd,
    AudioEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    End,
}

impl SessionEvent {
    /// Event name as listeners see it
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Start => "start",
            SessionEvent::AudioStart { .. } => "audiostart",
            SessionEvent::SoundStart => "soundstart",
            SessionEvent::SpeechStart => "speechstart",
            SessionEvent::Result(_) => "result",
            SessionEvent::NoMatch => "nomatch",
            SessionEvent::Error(_) => "error",
            SessionEvent::SpeechEnd => "speechend",
            SessionEvent::SoundEnd => "soundend",
            SessionEvent::AudioEnd { .. } => "audioend",
            SessionEvent::End => "end",
        }
    }
}

/// A session event as delivered to a sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub session_id: String,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SessionEvent,
}
