//! Recognition backends and the canonical event vocabulary
//!
//! - `backend`: the capability every engine implements and its raw callback shapes
//! - `events`: browser-compatible session events, results, and error taxonomy
//! - `normalizer`: pure mapping from raw shapes to canonical events
//! - `sink`: delivery of canonical events to listeners

pub mod backend;
pub mod events;
pub mod normalizer;
pub mod sink;

pub use backend::{
    BackendEvents, BackendFactory, BackendInput, Capabilities, RawCallback, RawError, RawResult,
    RawSegment, RawTranscription, RecognitionBackend, RecognitionRequest,
};
pub use events::{Alternative, EmittedEvent, ErrorCode, ErrorEvent, RecognitionResult, SessionEvent};
pub use sink::{BroadcastSink, EventSink, FanoutSink};
