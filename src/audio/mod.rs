pub mod backend;
pub mod convert;
pub mod file;
pub mod level;
pub mod microphone;
pub mod recorder;

pub use backend::{
    AudioCapture, AudioFormat, AudioFrame, AudioStreamSource, CaptureError, CaptureFactory,
};
pub use file::{AudioFile, FileFeedConfig};
pub use microphone::{DeviceLease, MicrophoneFactory};
pub use recorder::{RecordingMetadata, RecordingWriter};
