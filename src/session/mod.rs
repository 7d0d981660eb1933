//! Recognition session management
//!
//! This module provides the `SessionController` that owns one recognition
//! attempt end-to-end:
//! - Audio source acquisition (microphone capture or file playback)
//! - Frame delivery to the recognition backend
//! - Sound and speech activity transitions
//! - Inactivity auto-stop for non-continuous sessions
//! - Exactly-once lifecycle completion (`end` is always last)

mod config;
mod controller;
mod machine;
mod permissions;
mod stats;
mod timer;

pub use config::{
    AudioEncoding, AudioSourceConfig, ConfigError, RecognitionConfig, RecordingOptions, SourceKind,
};
pub use controller::{ControllerOptions, SessionController, SessionControllerBuilder};
pub(crate) use controller::Command;
pub use permissions::{AllowAll, PermissionCheck, PermissionStatus};
pub use stats::{SessionSnapshot, SessionState};
pub use timer::{Deadline, InactivityTimer, DEFAULT_INACTIVITY_TIMEOUT};
