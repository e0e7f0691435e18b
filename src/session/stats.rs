use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Statistics about a voice session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier, if a session has been started
    pub session_id: Option<String>,

    /// Current session state
    pub state: SessionState,

    /// When the session was started
    pub started_at: Option<DateTime<Utc>>,

    /// Time spent since start, in seconds (frozen at teardown)
    pub duration_secs: f64,

    /// Chunks produced by the microphone
    pub chunks_captured: u64,

    /// Chunks handed to the transport
    pub chunks_sent: u64,

    /// Chunks dropped because the transport was not ready
    pub chunks_dropped: u64,

    /// Transcript events received
    pub transcripts: u64,

    /// Response events received
    pub responses: u64,

    /// Audio payloads received
    pub payloads_received: u64,

    /// Incoming messages that failed to decode
    pub protocol_errors: u64,

    /// Audio payloads that failed to play
    pub playback_errors: u64,

    /// Most recent response latency in seconds
    pub last_latency_secs: Option<f64>,
}
