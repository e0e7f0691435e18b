pub mod channel;
pub mod connector;
pub mod endpoint;

pub use channel::{ConnectionState, SendOutcome, TransportChannel};
pub use connector::{Connector, Link, LinkEvent, WsConnector, OUTBOUND_DEPTH};
pub use endpoint::{voice_endpoint, VOICE_PATH};
