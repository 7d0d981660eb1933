//! Mapping from backend-specific callback shapes to the canonical event vocabulary
//!
//! Everything here is a pure function of its arguments. Session state (whether
//! speech was already detected, whether teardown started) lives in the
//! controller; this module only decides what a single callback means.

use super::backend::{RawError, RawResult, RawTranscription};
use super::events::{Alternative, ErrorCode, ErrorEvent, RecognitionResult};
use crate::audio::CaptureError;

/// On-device engine error codes
pub mod engine_codes {
    pub const AUDIO_READ_FAILED: i64 = 1;
    pub const UNDEFINED_TEMPLATE_CLASS: i64 = 2;
    pub const MALFORMED_LANGUAGE_MODEL: i64 = 3;
    pub const ASSETS_NOT_INSTALLED: i64 = 102;
    pub const DICTATION_DISABLED: i64 = 201;
    pub const RECOGNITION_RETRY: i64 = 203;
    pub const REQUEST_CANCELLED: i64 = 209;
    pub const SESSION_INVALIDATED: i64 = 216;
    pub const RECOGNITION_CANCELLED: i64 = 301;
    pub const RECOGNIZER_BUSY: i64 = 1100;
    pub const AUDIO_SESSION_FAILED: i64 = 1101;
    pub const SERVER_UNREACHABLE: i64 = 1107;
    pub const NO_SPEECH_DETECTED: i64 = 1110;
    pub const NOT_AUTHORIZED: i64 = 1700;
}

/// Normalize a raw result, truncated to `max_alternatives`
///
/// Empty transcripts are dropped; the remaining alternatives keep engine order.
pub fn normalize_result(raw: &RawResult, is_final: bool, max_alternatives: u32) -> RecognitionResult {
    let limit = max_alternatives.max(1) as usize;

    let results = match raw {
        RawResult::Ranked(transcriptions) => transcriptions
            .iter()
            .filter_map(ranked_alternative)
            .take(limit)
            .collect(),
        RawResult::Transcript { text, confidence } => {
            let text = text.trim();
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Alternative::new(text, confidence.filter(|c| *c >= 0.0))]
            }
        }
    };

    RecognitionResult { is_final, results }
}

/// Normalize a raw result and apply interim suppression
///
/// Returns `None` when the result is interim and interim results are disabled.
pub fn map_result(
    raw: &RawResult,
    is_final: bool,
    interim_results: bool,
    max_alternatives: u32,
) -> Option<RecognitionResult> {
    filter_interim(normalize_result(raw, is_final, max_alternatives), interim_results)
}

/// Drop interim results that must not reach listeners
///
/// Interim hypotheses are withheld when disabled or when nothing survived
/// normalization. Final results always pass.
pub fn filter_interim(result: RecognitionResult, interim_results: bool) -> Option<RecognitionResult> {
    if result.is_final {
        return Some(result);
    }
    if !interim_results || result.is_empty() {
        return None;
    }
    Some(result)
}

fn ranked_alternative(transcription: &RawTranscription) -> Option<Alternative> {
    let transcript = transcription.formatted.trim();
    if transcript.is_empty() {
        return None;
    }

    // Interim hypotheses come back with every segment at 0.0
    let scored = transcription.segments.iter().any(|s| s.confidence > 0.0);
    let confidence = if scored {
        let sum: f32 = transcription.segments.iter().map(|s| s.confidence).sum();
        Some(sum / transcription.segments.len() as f32)
    } else {
        None
    };

    Some(Alternative::new(transcript, confidence))
}

/// Map any backend error to an error event
pub fn normalize_error(raw: &RawError) -> ErrorEvent {
    match raw {
        RawError::Engine { code, message } => ErrorEvent::new(
            engine_error_code(*code),
            format!("{} (engine code {})", message, code),
        ),
        RawError::Service { code, message } => ErrorEvent::new(
            service_error_code(code),
            format!("{} (service code {})", message, code),
        ),
        RawError::Transport(message) => ErrorEvent::new(ErrorCode::Network, message.clone()),
        RawError::Capture(err) => ErrorEvent::new(capture_error_code(err), err.to_string()),
        RawError::Timeout(message) => ErrorEvent::new(ErrorCode::Network, message.clone()),
    }
}

pub fn engine_error_code(code: i64) -> ErrorCode {
    use engine_codes::*;

    match code {
        AUDIO_READ_FAILED | AUDIO_SESSION_FAILED => ErrorCode::AudioCapture,
        UNDEFINED_TEMPLATE_CLASS | MALFORMED_LANGUAGE_MODEL => ErrorCode::BadGrammar,
        ASSETS_NOT_INSTALLED => ErrorCode::LanguageNotSupported,
        DICTATION_DISABLED => ErrorCode::ServiceNotAllowed,
        RECOGNITION_RETRY | SERVER_UNREACHABLE => ErrorCode::Network,
        REQUEST_CANCELLED | SESSION_INVALIDATED | RECOGNITION_CANCELLED => ErrorCode::Aborted,
        RECOGNIZER_BUSY => ErrorCode::Busy,
        NO_SPEECH_DETECTED => ErrorCode::NoSpeech,
        NOT_AUTHORIZED => ErrorCode::NotAllowed,
        _ => ErrorCode::Unknown,
    }
}

pub fn service_error_code(code: &str) -> ErrorCode {
    let code = code.trim().to_ascii_lowercase().replace('-', "_");

    match code.as_str() {
        "no_speech" | "no_audio" | "speech_timeout" => ErrorCode::NoSpeech,
        "cancelled" | "canceled" | "aborted" => ErrorCode::Aborted,
        "bad_audio" | "invalid_audio" | "audio_format" => ErrorCode::AudioCapture,
        "timeout" | "unavailable" | "connection_lost" | "network" => ErrorCode::Network,
        "permission_denied" => ErrorCode::NotAllowed,
        "unauthorized" | "forbidden" | "quota_exceeded" | "on_device_unavailable" => {
            ErrorCode::ServiceNotAllowed
        }
        "invalid_grammar" | "invalid_phrase_list" => ErrorCode::BadGrammar,
        "unsupported_language" | "language_not_supported" => ErrorCode::LanguageNotSupported,
        "invalid_request" | "bad_request" => ErrorCode::Client,
        "busy" | "rate_limited" | "too_many_sessions" => ErrorCode::Busy,
        _ => ErrorCode::Unknown,
    }
}

pub fn capture_error_code(err: &CaptureError) -> ErrorCode {
    match err {
        CaptureError::DeviceBusy => ErrorCode::Busy,
        CaptureError::PermissionDenied(_) => ErrorCode::NotAllowed,
        CaptureError::NoDevice
        | CaptureError::Unavailable(_)
        | CaptureError::Stream(_)
        | CaptureError::Source(_) => ErrorCode::AudioCapture,
    }
}
