use serde::{Deserialize, Serialize};

/// One discrete message as delivered by the voice link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Structured text event sent by the voice service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlEvent {
    /// Recognized user speech
    Transcript { content: String },
    /// Assistant reply text
    Response { content: String },
}

/// Opaque encoded audio received from the voice service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload(pub Vec<u8>);

impl AudioPayload {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A decoded incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Control(ControlEvent),
    Audio(AudioPayload),
}
