// Wire codec for the voice link
//
// Outgoing audio is the bare little-endian i16 sample sequence, one chunk
// per binary message. Incoming text is a JSON control event, incoming
// binary is passed through untouched.

use super::messages::{AudioPayload, ControlEvent, Inbound, WireMessage};
use crate::audio::AudioChunk;
use crate::error::ProtocolError;

/// Encode a chunk into a binary wire frame.
pub fn encode_chunk(chunk: &AudioChunk) -> Vec<u8> {
    chunk.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Decode an incoming wire message.
pub fn decode(message: WireMessage) -> Result<Inbound, ProtocolError> {
    match message {
        WireMessage::Text(text) => decode_control(&text).map(Inbound::Control),
        WireMessage::Binary(bytes) => Ok(Inbound::Audio(AudioPayload(bytes))),
    }
}

/// Parse a text frame as a control event.
pub fn decode_control(text: &str) -> Result<ControlEvent, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
