// Integration tests for persisted microphone recordings

use anyhow::Result;
use loqa_speech::audio::{AudioFrame, AudioStreamSource, RecordingWriter};
use tempfile::TempDir;

fn frame(index: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![(index as i16) * 100; 1600],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: index * 100,
        source: AudioStreamSource::Microphone,
    }
}

#[test]
fn test_recording_writes_every_frame() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("nested").join("session.wav");

    let mut writer = RecordingWriter::create(&path, 16000, 1)?;
    assert_eq!(writer.path(), path.as_path());

    for i in 0..50 {
        writer.write_frame(&frame(i))?;
    }
    let metadata = writer.finish()?;

    assert_eq!(metadata.file_path, path);
    assert_eq!(metadata.sample_count, 50 * 1600);
    assert_eq!(metadata.end_ms, 4900);

    let reader = hound::WavReader::open(&path)?;
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len(), 50 * 1600);

    Ok(())
}

#[test]
fn test_recording_is_finalized_on_drop() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("dropped.wav");

    {
        let mut writer = RecordingWriter::create(&path, 16000, 1)?;
        writer.write_frame(&frame(1))?;
    }

    let reader = hound::WavReader::open(&path)?;
    assert_eq!(reader.len(), 1600);

    Ok(())
}

#[test]
fn test_audio_frame_helpers() {
    let frame = AudioFrame {
        samples: vec![1, -1, 256, 0],
        sample_rate: 16000,
        channels: 2,
        timestamp_ms: 0,
        source: AudioStreamSource::Microphone,
    };

    assert_eq!(frame.to_pcm_bytes(), vec![1, 0, 0xff, 0xff, 0, 1, 0, 0]);
    // Two samples per channel at 16kHz round down to 0ms
    assert_eq!(frame.duration_ms(), 0);
    assert_eq!(self::frame(0).duration_ms(), 100);
}

#[test]
fn test_recording_header_follows_first_frame() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("device-rate.wav");

    // Created for the session format, fed at the device's rate
    let mut writer = RecordingWriter::create(&path, 16000, 1)?;
    writer.write_frame(&AudioFrame {
        samples: vec![500; 4410],
        sample_rate: 44100,
        channels: 1,
        timestamp_ms: 0,
        source: AudioStreamSource::Microphone,
    })?;
    let metadata = writer.finish()?;

    assert_eq!(metadata.sample_rate, 44100);
    assert_eq!(metadata.sample_count, 4410);

    let reader = hound::WavReader::open(&path)?;
    assert_eq!(reader.spec().sample_rate, 44100);
    assert_eq!(reader.len(), 4410);
    assert_eq!(reader.duration(), 4410);

    Ok(())
}

#[test]
fn test_recording_rejects_format_change_after_audio() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("mixed.wav");

    let mut writer = RecordingWriter::create(&path, 16000, 1)?;
    writer.write_frame(&frame(1))?;

    let stereo = AudioFrame {
        samples: vec![0; 3200],
        sample_rate: 16000,
        channels: 2,
        timestamp_ms: 200,
        source: AudioStreamSource::Microphone,
    };
    assert!(writer.write_frame(&stereo).is_err());

    let metadata = writer.finish()?;
    assert_eq!(metadata.channels, 1);
    assert_eq!(metadata.sample_count, 1600);

    Ok(())
}
