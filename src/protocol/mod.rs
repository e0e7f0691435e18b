pub mod codec;
pub mod messages;

pub use codec::{decode, decode_control, encode_chunk};
pub use messages::{AudioPayload, ControlEvent, Inbound, WireMessage};
