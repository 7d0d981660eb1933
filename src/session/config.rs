use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::file::{DEFAULT_CHUNK_DELAY_MS, DEFAULT_CHUNK_SIZE_BYTES};
use crate::audio::{AudioFormat, FileFeedConfig};

/// PCM layout of a file audio source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// 16-bit signed little-endian PCM (WAV)
    #[default]
    Pcm16,
}

/// File-backed audio source for a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSourceConfig {
    /// Local path, `file://` URI, or a remote URI the backend reads itself
    pub uri: String,

    /// Sample rate to deliver to the backend (default: 16000)
    #[serde(default)]
    pub sample_rate: Option<u32>,

    /// Channels to deliver to the backend (default: 1)
    #[serde(default)]
    pub channels: Option<u16>,

    #[serde(default)]
    pub encoding: AudioEncoding,

    /// Delay between streamed chunks (default: 100ms)
    #[serde(default)]
    pub chunk_delay_millis: Option<u64>,

    /// PCM bytes per streamed chunk (default: 4096)
    #[serde(default)]
    pub chunk_size_bytes: Option<usize>,
}

impl AudioSourceConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            sample_rate: None,
            channels: None,
            encoding: AudioEncoding::default(),
            chunk_delay_millis: None,
            chunk_size_bytes: None,
        }
    }

    pub fn feed_config(&self) -> FileFeedConfig {
        FileFeedConfig {
            chunk_size_bytes: self.chunk_size_bytes.unwrap_or(DEFAULT_CHUNK_SIZE_BYTES),
            chunk_delay: Duration::from_millis(
                self.chunk_delay_millis.unwrap_or(DEFAULT_CHUNK_DELAY_MS),
            ),
            target_sample_rate: self.sample_rate.unwrap_or(16000),
            target_channels: self.channels.unwrap_or(1),
        }
    }
}

/// Persistence of captured microphone audio
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOptions {
    pub persist: bool,
    /// WAV file path; a file named after the session in the recordings directory when unset
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

/// Configuration for one recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionConfig {
    /// BCP-47 language tag (e.g., "en-US")
    pub lang: String,

    /// Deliver non-final hypotheses as `result` events
    pub interim_results: bool,

    /// Upper bound on alternatives per result
    pub max_alternatives: u32,

    /// Keep recognizing across utterances instead of stopping after the first final result
    pub continuous: bool,

    /// Phrases the engine should favour
    pub contextual_strings: Vec<String>,

    pub requires_on_device_recognition: bool,

    pub adds_punctuation: bool,

    /// File source; the microphone is used when unset
    pub audio_source: Option<AudioSourceConfig>,

    pub recording_options: Option<RecordingOptions>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            lang: "en-US".to_string(),
            interim_results: false,
            max_alternatives: 1,
            continuous: false,
            contextual_strings: Vec::new(),
            requires_on_device_recognition: false,
            adds_punctuation: false,
            audio_source: None,
            recording_options: None,
        }
    }
}

/// Rejected session configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("language tag must not be empty")]
    EmptyLanguage,
    #[error("maxAlternatives must be at least 1")]
    NoAlternatives,
    #[error("audio source URI must not be empty")]
    EmptySourceUri,
    #[error("audio source {0} must be greater than zero")]
    ZeroSourceParameter(&'static str),
}

/// Kind of audio source a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Microphone,
    File,
}

impl RecognitionConfig {
    pub fn source_kind(&self) -> SourceKind {
        if self.audio_source.is_some() {
            SourceKind::File
        } else {
            SourceKind::Microphone
        }
    }

    /// Whether captured microphone audio should be written to disk
    pub fn persists_audio(&self) -> bool {
        self.source_kind() == SourceKind::Microphone
            && self.recording_options.as_ref().map(|r| r.persist).unwrap_or(false)
    }

    /// Format requested from the microphone
    pub fn capture_format(&self) -> AudioFormat {
        AudioFormat::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lang.trim().is_empty() {
            return Err(ConfigError::EmptyLanguage);
        }

        if self.max_alternatives == 0 {
            return Err(ConfigError::NoAlternatives);
        }

        if let Some(source) = &self.audio_source {
            if source.uri.trim().is_empty() {
                return Err(ConfigError::EmptySourceUri);
            }
            if source.sample_rate == Some(0) {
                return Err(ConfigError::ZeroSourceParameter("sampleRate"));
            }
            if source.channels == Some(0) {
                return Err(ConfigError::ZeroSourceParameter("channels"));
            }
            if source.chunk_size_bytes == Some(0) {
                return Err(ConfigError::ZeroSourceParameter("chunkSizeBytes"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_browser_style_json() {
        let json = r#"{
            "lang": "fr-FR",
            "interimResults": true,
            "maxAlternatives": 3,
            "audioSource": { "uri": "file:///tmp/a.wav", "chunkDelayMillis": 20 },
            "recordingOptions": { "persist": true }
        }"#;

        let config: RecognitionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.lang, "fr-FR");
        assert!(config.interim_results);
        assert!(!config.continuous);
        assert_eq!(config.max_alternatives, 3);
        assert_eq!(config.source_kind(), SourceKind::File);
        // Persistence only applies to microphone capture
        assert!(!config.persists_audio());

        let feed = config.audio_source.unwrap().feed_config();
        assert_eq!(feed.chunk_delay, Duration::from_millis(20));
        assert_eq!(feed.chunk_size_bytes, 4096);
    }

    #[test]
    fn validation_rejects_unusable_configs() {
        let mut config = RecognitionConfig::default();
        assert!(config.validate().is_ok());

        config.max_alternatives = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoAlternatives));

        config.max_alternatives = 1;
        config.audio_source = Some(AudioSourceConfig {
            chunk_size_bytes: Some(0),
            ..AudioSourceConfig::new("a.wav")
        });
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroSourceParameter("chunkSizeBytes"))
        );
    }
}
