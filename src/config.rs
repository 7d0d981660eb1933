use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::ControllerOptions;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub recognition: RecognitionSettings,
    pub nats: NatsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-speech".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

/// Controller defaults applied to every session
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Default language for one-shot `recognize` runs
    pub lang: String,
    pub inactivity_timeout_ms: u64,
    pub finish_timeout_ms: u64,
    pub start_timeout_ms: u64,
    pub activity_threshold: f32,
    pub recordings_path: String,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        let options = ControllerOptions::default();
        Self {
            lang: "en-US".to_string(),
            inactivity_timeout_ms: options.inactivity_timeout.as_millis() as u64,
            finish_timeout_ms: options.finish_timeout.as_millis() as u64,
            start_timeout_ms: options.start_timeout.as_millis() as u64,
            activity_threshold: options.activity_threshold,
            recordings_path: options.recordings_dir.display().to_string(),
        }
    }
}

impl RecognitionSettings {
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            inactivity_timeout: Duration::from_millis(self.inactivity_timeout_ms),
            finish_timeout: Duration::from_millis(self.finish_timeout_ms),
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            activity_threshold: self.activity_threshold.clamp(0.0, 1.0),
            recordings_dir: PathBuf::from(&self.recordings_path),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
        }
    }
}

impl Config {
    /// Load from a config file (any format the `config` crate knows) plus
    /// `LOQA_`-prefixed environment overrides, e.g. `LOQA_NATS__URL`
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LOQA").separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
