//! Error types for voice sessions.
//!
//! Each failure source has its own enum so that callers can tell a refused
//! microphone from a refused socket. `SessionError` wraps them all for the
//! notification stream.

use thiserror::Error;

/// Microphone acquisition or mid-stream device failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("No usable input device: {0}")]
    Unavailable(String),

    #[error("Input device disconnected: {0}")]
    Disconnected(String),
}

/// Failures while opening the voice link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Invalid voice endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Handshake with {url} failed: {message}")]
    Handshake { url: String, message: String },

    #[error("Handshake with {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },
}

/// Failures of an already open voice link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection lost: {0}")]
    Failed(String),
}

/// Malformed incoming text frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed control message: {0}")]
    Malformed(String),
}

/// Decode or render failures of assistant audio.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Empty audio payload")]
    Empty,

    #[error("Audio payload could not be decoded: {0}")]
    Decode(String),

    #[error("Audio output unavailable: {0}")]
    OutputUnavailable(String),
}

/// Any error a session reports to its observer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl SessionError {
    /// Whether this error ends the session it occurred in.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Device(_) | SessionError::Connect(_) | SessionError::Transport(_)
        )
    }
}
