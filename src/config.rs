use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::SessionConfig;
use crate::transport::voice_endpoint;

/// Prefix of environment overrides, e.g. `LOQA_VOICE__SERVICE__ORIGIN`
pub const ENV_PREFIX: &str = "LOQA_VOICE";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Origin of the hosting page, e.g. `http://localhost:8000`
    pub origin: String,
    /// Explicit socket URL, bypassing derivation from `origin`
    #[serde(default)]
    pub url: Option<String>,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_size: usize,
    /// Input device name (default device when unset)
    #[serde(default)]
    pub device: Option<String>,
    pub level_interval_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaybackConfig {
    /// Rate used to play headerless 16-bit PCM payloads
    #[serde(default)]
    pub raw_pcm_sample_rate: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordingConfig {
    /// Directory for WAV copies of outgoing audio
    #[serde(default)]
    pub output_dir: Option<String>,
}

impl Config {
    /// Load `path` (any extension the config crate knows, optional) over defaults,
    /// then apply `LOQA_VOICE__*` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "loqa-voice")?
            .set_default("service.origin", "http://localhost:8000")?
            .set_default("service.connect_timeout_ms", 10_000_i64)?
            .set_default("audio.sample_rate", 16_000_i64)?
            .set_default("audio.channels", 1_i64)?
            .set_default("audio.block_size", crate::audio::DEFAULT_BLOCK_SIZE as i64)?
            .set_default("audio.level_interval_ms", 16_i64)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// The voice socket URL for this configuration.
    pub fn endpoint(&self) -> Result<String> {
        match &self.service.url {
            Some(url) => Ok(url.clone()),
            None => Ok(voice_endpoint(&self.service.origin)?),
        }
    }

    /// Validate and convert into the runtime session configuration.
    pub fn session_config(&self) -> Result<SessionConfig> {
        if self.audio.sample_rate == 0 {
            bail!("audio.sample_rate must be positive");
        }
        if self.audio.channels != 1 {
            bail!("audio.channels must be 1 (the voice service expects mono)");
        }
        if self.audio.block_size == 0 {
            bail!("audio.block_size must be positive");
        }
        if self.service.connect_timeout_ms == 0 {
            bail!("service.connect_timeout_ms must be positive");
        }

        Ok(SessionConfig {
            endpoint: self.endpoint()?,
            connect_timeout: Duration::from_millis(self.service.connect_timeout_ms),
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            block_size: self.audio.block_size,
            level_interval: Duration::from_millis(self.audio.level_interval_ms),
            raw_pcm_sample_rate: self.playback.raw_pcm_sample_rate,
            recording_dir: self.recording.output_dir.as_ref().map(PathBuf::from),
        })
    }
}
