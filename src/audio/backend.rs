use anyhow::Result;
use tokio::sync::mpsc;

/// Where an audio frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioStreamSource {
    /// Live microphone input
    Microphone,
    /// Audio asset streamed from disk
    File,
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
    /// Audio stream source (microphone or file)
    pub source: AudioStreamSource,
}

impl AudioFrame {
    /// Little-endian PCM bytes, the layout recognition engines expect
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Frame duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

/// Sample format requested from an audio source
#[derive(Debug, Clone)]
pub struct AudioFormat {
    /// Target sample rate (decimated if the device runs faster)
    pub sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub frame_duration_ms: u64,
    /// Capacity of the bounded frame channel; frames are dropped once it is full
    pub queue_frames: usize,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,   // 16kHz for speech engines
            channels: 1,          // Mono
            frame_duration_ms: 100,
            queue_frames: 50,     // ~5s of 100ms frames
        }
    }
}

impl AudioFormat {
    /// Number of interleaved samples in one frame
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as u64 * self.frame_duration_ms / 1000) as usize * self.channels as usize
    }
}

/// Errors raised while opening or running an audio source
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("Audio device is already in use")]
    DeviceBusy,
    #[error("No audio input device available")]
    NoDevice,
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("Audio capture unavailable: {0}")]
    Unavailable(String),
    #[error("Audio stream error: {0}")]
    Stream(String),
    #[error("Audio source error: {0}")]
    Source(String),
}

/// Live audio capture trait
///
/// The controller owns the capture for the lifetime of a session. Frames are
/// delivered through a bounded channel; implementations must use `try_send`
/// from their capture callback and drop frames when the channel is full.
#[async_trait::async_trait]
pub trait AudioCapture: Send {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if capture is currently running
    fn is_capturing(&self) -> bool;

    /// Capture name for logging
    fn name(&self) -> &str;
}

/// Builds a fresh capture for each microphone session
pub trait CaptureFactory: Send + Sync {
    fn create(&self, format: AudioFormat) -> Result<Box<dyn AudioCapture>, CaptureError>;
}
