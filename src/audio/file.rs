use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::backend::{AudioFrame, AudioStreamSource, CaptureError};
use super::convert;

/// Default chunk size for paced file streaming (4 KiB of PCM)
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 4096;

/// Default delay between streamed chunks
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 100;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            anyhow::bail!(
                "Unsupported WAV encoding: {:?} {}-bit (expected 16-bit PCM)",
                spec.sample_format,
                spec.bits_per_sample
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Resolve an audio source URI to a local path
///
/// Accepts plain paths and `file://` URIs. Remote assets must be handed to a
/// backend that reads URIs itself.
pub fn resolve_uri(uri: &str) -> Result<PathBuf, CaptureError> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }

    if let Some((scheme, _)) = uri.split_once("://") {
        return Err(CaptureError::Source(format!(
            "Cannot stream '{}' audio locally: {}",
            scheme, uri
        )));
    }

    Ok(PathBuf::from(uri))
}

/// Pacing and format settings for a file feed
#[derive(Debug, Clone)]
pub struct FileFeedConfig {
    /// PCM bytes per streamed chunk
    pub chunk_size_bytes: usize,
    /// Artificial delay between chunks to emulate live-rate input
    pub chunk_delay: Duration,
    /// Sample rate requested by the session
    pub target_sample_rate: u32,
    /// Channel count requested by the session
    pub target_channels: u16,
}

impl Default for FileFeedConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            chunk_delay: Duration::from_millis(DEFAULT_CHUNK_DELAY_MS),
            target_sample_rate: 16000,
            target_channels: 1,
        }
    }
}

/// Stream an audio file into a frame channel in fixed-size chunks
///
/// The channel closes when the whole file has been sent, which is how the
/// receiver learns that playback is over.
pub fn spawn_feeder(
    audio: AudioFile,
    config: FileFeedConfig,
    tx: mpsc::Sender<AudioFrame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let channels = audio.channels.max(1) as usize;
        // Keep chunks aligned to whole sample frames
        let samples_per_chunk = ((config.chunk_size_bytes / 2) / channels).max(1) * channels;
        let total_chunks = audio.samples.len().div_ceil(samples_per_chunk);

        info!(
            "Streaming {} in {} chunks ({} bytes, {}ms apart)",
            audio.path,
            total_chunks,
            samples_per_chunk * 2,
            config.chunk_delay.as_millis()
        );

        let mut converter =
            convert::FrameConverter::new(config.target_sample_rate, config.target_channels);
        let mut offset_samples = 0usize;
        for (index, chunk) in audio.samples.chunks(samples_per_chunk).enumerate() {
            if index > 0 && !config.chunk_delay.is_zero() {
                tokio::time::sleep(config.chunk_delay).await;
            }

            let timestamp_ms =
                (offset_samples / channels) as u64 * 1000 / audio.sample_rate.max(1) as u64;
            offset_samples += chunk.len();

            let frame = AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                timestamp_ms,
                source: AudioStreamSource::File,
            };
            let frame = match converter.convert(frame) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    error!("Stopping file feed for {}: {:#}", audio.path, e);
                    return;
                }
            };

            if tx.send(frame).await.is_err() {
                debug!("File feed receiver dropped after {} chunks", index);
                return;
            }
        }

        let end_ms = (audio.duration_seconds * 1000.0) as u64;
        match converter.flush(end_ms, AudioStreamSource::File) {
            Ok(Some(frame)) => {
                if tx.send(frame).await.is_err() {
                    debug!("File feed receiver dropped before the last chunk");
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => error!("Dropping resampler tail for {}: {:#}", audio.path, e),
        }

        info!("File feed complete: {}", audio.path);
    })
}
