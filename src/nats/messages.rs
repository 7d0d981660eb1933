use serde::{Deserialize, Serialize};

/// Audio frame message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u32,
    pub pcm: String,  // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String,  // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
    /// BCP-47 tag the STT service should decode with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    /// Absent or negative when the service does not score transcripts
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Error reported by the STT service for one session
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub session_id: String,
    pub code: String,
    #[serde(default)]
    pub message: String,
}
