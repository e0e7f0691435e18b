// Unit tests for the voice link wire codec

use loqa_voice::audio::AudioChunk;
use loqa_voice::error::ProtocolError;
use loqa_voice::protocol::{decode, decode_control, encode_chunk, AudioPayload, ControlEvent, Inbound, WireMessage};

#[test]
fn test_encode_chunk_is_little_endian_samples() {
    let chunk = AudioChunk::new(0, vec![1, -1, 0x1234, i16::MIN]);

    let frame = encode_chunk(&chunk);

    assert_eq!(frame, vec![0x01, 0x00, 0xFF, 0xFF, 0x34, 0x12, 0x00, 0x80]);
}

#[test]
fn test_encode_full_block_size() {
    let chunk = AudioChunk::new(7, vec![0; 4096]);
    assert_eq!(encode_chunk(&chunk).len(), 8192);
}

#[test]
fn test_decode_transcript() {
    let event = decode_control(r#"{"type":"transcript","content":"hello there"}"#).unwrap();
    assert_eq!(
        event,
        ControlEvent::Transcript {
            content: "hello there".to_string()
        }
    );
}

#[test]
fn test_decode_response() {
    let inbound = decode(WireMessage::Text(r#"{"type":"response","content":"Hi!"}"#.to_string())).unwrap();
    assert_eq!(
        inbound,
        Inbound::Control(ControlEvent::Response {
            content: "Hi!".to_string()
        })
    );
}

#[test]
fn test_decode_ignores_extra_fields() {
    let event = decode_control(r#"{"type":"response","content":"ok","id":3}"#).unwrap();
    assert_eq!(
        event,
        ControlEvent::Response {
            content: "ok".to_string()
        }
    );
}

#[test]
fn test_decode_unknown_type_is_malformed() {
    let result = decode_control(r#"{"type":"unknown"}"#);
    assert!(matches!(result, Err(ProtocolError::Malformed(_))));
}

#[test]
fn test_decode_rejects_invalid_text() {
    for text in ["not json", "", "{}", r#"{"type":"transcript"}"#, r#"{"type":"response","content":5}"#] {
        assert!(
            matches!(decode_control(text), Err(ProtocolError::Malformed(_))),
            "accepted {:?}",
            text
        );
    }
}

#[test]
fn test_decode_binary_passes_through() {
    let bytes = vec![0x52, 0x49, 0x46, 0x46, 0x00];
    let inbound = decode(WireMessage::Binary(bytes.clone())).unwrap();

    assert_eq!(inbound, Inbound::Audio(AudioPayload(bytes)));
}

#[test]
fn test_control_event_serializes_with_type_tag() {
    let json = serde_json::to_value(ControlEvent::Transcript {
        content: "x".to_string(),
    })
    .unwrap();

    assert_eq!(json["type"], "transcript");
    assert_eq!(json["content"], "x");
}
