//! Voice session management
//!
//! This module provides the `SessionController` that ties together:
//! - Microphone capture (one chunk per block interval)
//! - The duplex voice link (audio out, control events and audio in)
//! - Playback of assistant audio
//! - Status, message, latency and level notifications for a presenter

mod config;
mod controller;
mod events;
mod state;
mod stats;

pub use config::SessionConfig;
pub use controller::{SessionController, SessionDeps, SessionHandle};
pub use events::{MessageKind, SessionEvent};
pub use state::SessionState;
pub use stats::SessionStats;
