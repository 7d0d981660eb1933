use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use tracing::{debug, info};

use super::messages::AudioFrameMessage;

/// Subject for transcripts of every session; messages are filtered by `session_id`
pub const TRANSCRIPT_SUBJECT: &str = "stt.text.>";

pub fn audio_subject(session_id: &str) -> String {
    format!("audio.frame.{}", session_id)
}

pub fn error_subject(session_id: &str) -> String {
    format!("stt.error.{}", session_id)
}

pub struct NatsClient {
    client: Client,
    session_id: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, session_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Publish audio frame to NATS
    pub async fn publish_audio_frame(
        &self,
        pcm_bytes: &[u8],
        sample_rate: u32,
        channels: u16,
        sequence: u32,
        is_final: bool,
        language: Option<&str>,
    ) -> Result<()> {
        let subject = audio_subject(&self.session_id);

        let message = AudioFrameMessage {
            session_id: self.session_id.clone(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate,
            channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
            language: language.map(str::to_string),
        };

        let payload = serde_json::to_vec(&message)?;

        self.client.publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (seq={}, bytes={}, final={})",
            subject, sequence, pcm_bytes.len(), is_final
        );

        Ok(())
    }

    /// Subscribe to transcript messages
    pub async fn subscribe_transcripts(&self) -> Result<async_nats::Subscriber> {
        // The STT service publishes to stt.text.partial and stt.text.final
        info!("Subscribing to transcripts on {}", TRANSCRIPT_SUBJECT);

        self.client.subscribe(TRANSCRIPT_SUBJECT)
            .await
            .context("Failed to subscribe to transcripts")
    }

    /// Subscribe to errors reported for this session
    pub async fn subscribe_errors(&self) -> Result<async_nats::Subscriber> {
        let subject = error_subject(&self.session_id);

        info!("Subscribing to STT errors on {}", subject);

        self.client.subscribe(subject)
            .await
            .context("Failed to subscribe to STT errors")
    }

    /// Flush pending publishes before the connection is dropped
    pub async fn close(self) -> Result<()> {
        info!("Closing NATS connection");
        self.client.flush().await.context("Failed to flush NATS connection")?;
        Ok(())
    }
}
