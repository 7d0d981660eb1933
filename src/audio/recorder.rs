use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::backend::AudioFrame;

/// Summary of a finished recording
#[derive(Debug, Clone)]
pub struct RecordingMetadata {
    /// File path of the WAV recording
    pub file_path: PathBuf,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Number of samples written
    pub sample_count: usize,
    /// Timestamp of the last frame written, in milliseconds
    pub end_ms: u64,
}

/// Persists captured microphone frames to a WAV file
///
/// Frames are duplicated here as they flow to the recognition backend; the
/// file is finalized when the session tears down. The header takes the format
/// of the first frame written, whatever format the writer was created with.
pub struct RecordingWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: RecordingMetadata,
}

impl RecordingWriter {
    pub fn create(file_path: impl AsRef<Path>, sample_rate: u32, channels: u16) -> Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context("Failed to create recordings directory")?;
            }
        }

        let writer = open_wav(&file_path, sample_rate, channels)?;

        info!("Recording audio to {}", file_path.display());

        Ok(Self {
            writer: Some(writer),
            metadata: RecordingMetadata {
                file_path,
                sample_rate,
                channels,
                sample_count: 0,
                end_ms: 0,
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.metadata.file_path
    }

    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        self.adopt_format(frame.sample_rate, frame.channels)?;

        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer.write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }

            self.metadata.end_ms = frame.timestamp_ms;
            self.metadata.sample_count += frame.samples.len();
        }

        Ok(())
    }

    /// Reopen with the frame's format while nothing has been written
    fn adopt_format(&mut self, sample_rate: u32, channels: u16) -> Result<()> {
        if self.metadata.sample_rate == sample_rate && self.metadata.channels == channels {
            return Ok(());
        }

        if self.metadata.sample_count > 0 {
            bail!(
                "Frame format {}Hz/{}ch does not match recording {}Hz/{}ch",
                sample_rate,
                channels,
                self.metadata.sample_rate,
                self.metadata.channels
            );
        }

        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        debug!(
            "Recording {} switches to {}Hz/{}ch",
            self.metadata.file_path.display(),
            sample_rate,
            channels
        );
        self.writer = Some(open_wav(&self.metadata.file_path, sample_rate, channels)?);
        self.metadata.sample_rate = sample_rate;
        self.metadata.channels = channels;
        Ok(())
    }

    pub fn finish(mut self) -> Result<RecordingMetadata> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()
                .context("Failed to finalize WAV file")?;
        }

        info!(
            "Recording saved: {} ({} samples)",
            self.metadata.file_path.display(),
            self.metadata.sample_count
        );

        Ok(self.metadata.clone())
    }
}

fn open_wav(path: &Path, sample_rate: u32, channels: u16) -> Result<hound::WavWriter<BufWriter<File>>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))
}

impl Drop for RecordingWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
