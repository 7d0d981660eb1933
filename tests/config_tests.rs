// Tests for file and environment configuration

use anyhow::Result;
use loqa_speech::Config;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_from_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("speech.toml");
    std::fs::write(
        &path,
        r#"
[service]
name = "speech-test"

[service.http]
bind = "0.0.0.0"
port = 9090

[recognition]
inactivity_timeout_ms = 1500
recordings_path = "/var/lib/loqa/recordings"

[nats]
url = "nats://nats.internal:4222"
"#,
    )?;

    let cfg = Config::load(path.to_str().unwrap())?;
    assert_eq!(cfg.service.name, "speech-test");
    assert_eq!(cfg.service.http.port, 9090);
    assert_eq!(cfg.nats.url, "nats://nats.internal:4222");

    let options = cfg.recognition.controller_options();
    assert_eq!(options.inactivity_timeout, Duration::from_millis(1500));
    // Unset keys keep their defaults
    assert_eq!(options.finish_timeout, Duration::from_secs(5));
    assert_eq!(options.recordings_dir.to_str(), Some("/var/lib/loqa/recordings"));

    Ok(())
}

#[test]
fn test_missing_config_file_uses_defaults() -> Result<()> {
    let cfg = Config::load("/nonexistent/loqa-speech")?;

    assert_eq!(cfg.service.http.port, 3030);
    assert_eq!(cfg.recognition.lang, "en-US");

    let options = cfg.recognition.controller_options();
    assert_eq!(options.inactivity_timeout, Duration::from_millis(3000));
    assert_eq!(options.start_timeout, Duration::from_secs(10));
    Ok(())
}
