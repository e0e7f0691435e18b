use serde::Serialize;
use std::fmt;

use super::state::SessionState;
use crate::error::SessionError;

/// Who a chat message comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MessageKind::User => "you",
            MessageKind::Assistant => "assistant",
            MessageKind::System => "system",
        };
        f.write_str(label)
    }
}

/// Notifications from a session to its presenter.
///
/// The session never renders anything itself; everything a user could see
/// arrives through these events.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged(SessionState),
    Message { kind: MessageKind, text: String },
    /// Seconds between the last outgoing audio and the assistant response
    LatencyMeasured(f64),
    /// Input level in percent
    LevelChanged(f32),
    /// A reported error. Fatal ones are followed by a status change.
    Fault(SessionError),
}
