use base64::Engine;
use loqa_speech::nats::client::{audio_subject, error_subject, TRANSCRIPT_SUBJECT};
use loqa_speech::nats::messages::{AudioFrameMessage, ErrorMessage, TranscriptMessage};
use loqa_speech::nats::NatsBackendFactory;
use loqa_speech::recognition::{normalizer, BackendFactory, ErrorCode};
use loqa_speech::session::RecognitionConfig;

#[test]
fn test_audio_frame_serialization() {
    let msg = AudioFrameMessage {
        session_id: "session-1".to_string(),
        sequence: 0,
        pcm: base64::engine::general_purpose::STANDARD.encode([0u8; 100]),
        sample_rate: 16000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        final_frame: false,
        language: Some("en-US".to_string()),
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("session-1"));
    assert!(json.contains("16000"));
    assert!(json.contains("\"final\":false"));
    assert!(json.contains("\"sequence\":0"));
    assert!(json.contains("\"language\":\"en-US\""));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.session_id, "session-1");
    assert_eq!(deserialized.sample_rate, 16000);
    assert_eq!(deserialized.channels, 1);
    assert_eq!(deserialized.sequence, 0);
    assert!(!deserialized.final_frame);
}

#[test]
fn test_audio_frame_final_marker() {
    let msg = AudioFrameMessage {
        session_id: "session-1".to_string(),
        sequence: 10,
        pcm: String::new(), // Empty for final marker
        sample_rate: 16000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        final_frame: true,
        language: None,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"final\":true"));
    assert!(!json.contains("language"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert!(deserialized.final_frame);
    assert!(deserialized.pcm.is_empty());
    assert_eq!(deserialized.sequence, 10);
    assert_eq!(deserialized.language, None);
}

#[test]
fn test_transcript_deserialization() {
    let json = r#"{
        "session_id": "session-1",
        "text": "Hello world",
        "partial": false,
        "timestamp": "2025-10-27T14:30:05Z",
        "confidence": 0.95
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.session_id, "session-1");
    assert_eq!(msg.text, "Hello world");
    assert!(!msg.partial);
    assert_eq!(msg.confidence, Some(0.95));
    assert_eq!(msg.timestamp, "2025-10-27T14:30:05Z");
}

#[test]
fn test_transcript_no_confidence() {
    let json = r#"{
        "session_id": "session-1",
        "text": "No confidence score",
        "partial": true,
        "timestamp": "2025-10-27T14:30:05Z"
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert!(msg.partial);
    assert_eq!(msg.confidence, None);
}

#[test]
fn test_error_message_maps_through_service_codes() {
    let json = r#"{"session_id": "session-1", "code": "unsupported-language", "message": "no model for xx"}"#;

    let msg: ErrorMessage = serde_json::from_str(json).unwrap();
    assert_eq!(normalizer::service_error_code(&msg.code), ErrorCode::LanguageNotSupported);
    assert_eq!(msg.message, "no model for xx");
}

#[test]
fn test_subjects() {
    assert_eq!(audio_subject("session-1"), "audio.frame.session-1");
    assert_eq!(error_subject("session-1"), "stt.error.session-1");
    assert_eq!(TRANSCRIPT_SUBJECT, "stt.text.>");
}

#[test]
fn test_factory_rejects_on_device_requirement() {
    // Never connects: the rejection happens before any network I/O
    let factory = NatsBackendFactory::new("nats://127.0.0.1:1");

    let config = RecognitionConfig {
        requires_on_device_recognition: true,
        ..RecognitionConfig::default()
    };
    let err = match factory.create(&config) {
        Ok(_) => panic!("on-device recognition should be rejected"),
        Err(err) => err,
    };
    assert_eq!(normalizer::normalize_error(&err).code, ErrorCode::ServiceNotAllowed);

    let backend = factory.create(&RecognitionConfig::default()).unwrap();
    assert_eq!(backend.name(), "nats");
    assert!(backend.capabilities().graceful_finish);
    assert!(!backend.capabilities().reads_uri);
}

#[test]
fn test_pcm_encoding_roundtrip() {
    let frame = loqa_speech::AudioFrame {
        samples: vec![100, -200, 300, -400],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
        source: loqa_speech::AudioStreamSource::Microphone,
    };

    let encoded = base64::engine::general_purpose::STANDARD.encode(frame.to_pcm_bytes());

    let decoded_bytes = base64::engine::general_purpose::STANDARD
        .decode(&encoded)
        .unwrap();
    let decoded_samples: Vec<i16> = decoded_bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    assert_eq!(decoded_samples, frame.samples);
}
