use futures::stream::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::NatsClient;
use super::messages::{ErrorMessage, TranscriptMessage};
use crate::audio::AudioFrame;
use crate::recognition::{
    BackendEvents, BackendFactory, BackendInput, Capabilities, RawError, RawResult,
    RecognitionBackend, RecognitionRequest,
};
use crate::session::RecognitionConfig;

/// Service code for sessions that demand on-device recognition
pub const ON_DEVICE_UNAVAILABLE: &str = "on_device_unavailable";

/// Builds NATS-backed recognizers for a fixed server
#[derive(Debug, Clone)]
pub struct NatsBackendFactory {
    url: String,
}

impl NatsBackendFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl BackendFactory for NatsBackendFactory {
    fn create(&self, config: &RecognitionConfig) -> Result<Box<dyn RecognitionBackend>, RawError> {
        if config.requires_on_device_recognition {
            return Err(RawError::Service {
                code: ON_DEVICE_UNAVAILABLE.to_string(),
                message: "The NATS speech service cannot recognize on-device".to_string(),
            });
        }

        Ok(Box::new(NatsBackend::new(self.url.clone(), config.lang.clone())))
    }
}

/// Network recognizer: PCM frames out over NATS, transcripts back in
pub struct NatsBackend {
    url: String,
    language: String,
    client: Option<NatsClient>,
    listener: Option<JoinHandle<()>>,
    sequence: u32,
    sample_rate: u32,
    channels: u16,
}

impl NatsBackend {
    pub fn new(url: String, language: String) -> Self {
        Self {
            url,
            language,
            client: None,
            listener: None,
            sequence: 0,
            sample_rate: 16000,
            channels: 1,
        }
    }

    fn client(&self) -> Result<&NatsClient, RawError> {
        self.client
            .as_ref()
            .ok_or_else(|| RawError::Transport("NATS backend is not connected".to_string()))
    }

    fn next_sequence(&mut self) -> u32 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }
}

fn transport(err: anyhow::Error) -> RawError {
    RawError::Transport(format!("{:#}", err))
}

#[async_trait::async_trait]
impl RecognitionBackend for NatsBackend {
    fn name(&self) -> &str {
        "nats"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            graceful_finish: true,
            reads_uri: false,
        }
    }

    async fn start(&mut self, request: RecognitionRequest, events: BackendEvents) -> Result<(), RawError> {
        match request.input {
            BackendInput::Stream {
                sample_rate,
                channels,
            } => {
                self.sample_rate = sample_rate;
                self.channels = channels;
            }
            BackendInput::Uri(uri) => {
                return Err(RawError::Service {
                    code: "invalid_request".to_string(),
                    message: format!("NATS backend cannot read {} directly", uri),
                });
            }
        }

        let client = NatsClient::connect(&self.url, request.session_id.clone())
            .await
            .map_err(transport)?;
        let mut transcripts = client.subscribe_transcripts().await.map_err(transport)?;
        let mut errors = client.subscribe_errors().await.map_err(transport)?;
        let session_id = request.session_id;

        let listener = tokio::spawn(async move {
            info!("Listening for transcripts for {}", session_id);

            loop {
                tokio::select! {
                    msg = transcripts.next() => {
                        let Some(msg) = msg else {
                            events.error(RawError::Transport("Transcript subscription closed".to_string()));
                            break;
                        };
                        let transcript: TranscriptMessage = match serde_json::from_slice(&msg.payload) {
                            Ok(t) => t,
                            Err(e) => {
                                warn!("Failed to parse transcript: {}", e);
                                continue;
                            }
                        };
                        if transcript.session_id != session_id {
                            continue;
                        }

                        debug!(
                            "Transcript for {} (partial={}): {}",
                            session_id, transcript.partial, transcript.text
                        );
                        let result = RawResult::Transcript {
                            text: transcript.text,
                            confidence: transcript.confidence,
                        };
                        let accepted = if transcript.partial {
                            events.partial(result)
                        } else {
                            events.final_result(result)
                        };
                        if !accepted {
                            break;
                        }
                    }
                    msg = errors.next() => {
                        let Some(msg) = msg else {
                            break;
                        };
                        match serde_json::from_slice::<ErrorMessage>(&msg.payload) {
                            Ok(err) => {
                                warn!("STT service reported {} for {}: {}", err.code, session_id, err.message);
                                events.error(RawError::Service {
                                    code: err.code,
                                    message: err.message,
                                });
                                break;
                            }
                            Err(e) => warn!("Failed to parse STT error: {}", e),
                        }
                    }
                }
            }

            debug!("Transcript listener for {} stopped", session_id);
        });

        self.client = Some(client);
        self.listener = Some(listener);
        self.sequence = 0;

        Ok(())
    }

    async fn feed(&mut self, frame: &AudioFrame) -> Result<(), RawError> {
        let sequence = self.next_sequence();
        let pcm = frame.to_pcm_bytes();

        self.client()?
            .publish_audio_frame(
                &pcm,
                frame.sample_rate,
                frame.channels,
                sequence,
                false,
                Some(self.language.as_str()),
            )
            .await
            .map_err(transport)
    }

    async fn finish(&mut self) -> Result<(), RawError> {
        let sequence = self.next_sequence();
        info!("Publishing final frame marker (seq={})", sequence);

        self.client()?
            .publish_audio_frame(&[], self.sample_rate, self.channels, sequence, true, None)
            .await
            .map_err(transport)
    }

    async fn cancel(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                warn!("Failed to close NATS connection: {:#}", e);
            }
        }
    }
}
