use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Voice socket URL (e.g., "ws://localhost:8000/ws/voice")
    pub endpoint: String,

    /// Maximum time to wait for the socket handshake
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Sample rate of outgoing audio (the service expects 16kHz)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono)
    pub channels: u16,

    /// Samples per outgoing frame
    pub block_size: usize,

    /// Level meter polling cadence
    pub level_interval: Duration,

    /// Sample rate for headerless PCM payloads, if the service sends them
    pub raw_pcm_sample_rate: Option<u32>,

    /// Directory for WAV recordings of outgoing audio
    pub recording_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000/ws/voice".to_string(),
            connect_timeout: Duration::from_secs(10),
            sample_rate: 16000,
            channels: 1,
            block_size: crate::audio::DEFAULT_BLOCK_SIZE,
            level_interval: crate::audio::level::DEFAULT_LEVEL_INTERVAL,
            raw_pcm_sample_rate: None,
            recording_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn capture_config(&self) -> crate::audio::CaptureConfig {
        crate::audio::CaptureConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            block_size: self.block_size,
        }
    }
}
