use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally visible session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Opening the link or acquiring the microphone
    Connecting,
    /// Link open and microphone streaming
    Streaming,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting...",
            SessionState::Streaming => "Recording...",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
