pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use audio::{
    quantize, AudioChunk, AudioOutput, CaptureConfig, CaptureDevice, CaptureEvent, CapturePipeline,
    CpalMicrophone, DecodedAudio, PlaybackPipeline, RodioOutput,
};
pub use config::Config;
pub use error::{ConnectError, DeviceError, PlaybackError, ProtocolError, SessionError, TransportError};
pub use protocol::{AudioPayload, ControlEvent, WireMessage};
pub use session::{
    MessageKind, SessionConfig, SessionController, SessionDeps, SessionEvent, SessionHandle,
    SessionState, SessionStats,
};
pub use transport::{ConnectionState, Connector, TransportChannel, WsConnector};
