use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use super::connector::{Connector, LinkEvent};
use crate::error::ConnectError;

/// Lifecycle of a transport channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Result of a send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Dropped because the channel is not open
    NotOpen,
    /// Dropped because the previous frame is still being written
    Busy,
}

/// A single duplex connection to the voice service.
///
/// Sends are never queued: while the channel is not open, or while the
/// previous frame is still in flight, new frames are dropped.
pub struct TransportChannel {
    url: String,
    state: ConnectionState,
    outbound: Option<mpsc::Sender<Vec<u8>>>,
    inbound: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    frames_sent: u64,
    frames_dropped: u64,
}

impl TransportChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: ConnectionState::Idle,
            outbound: None,
            inbound: None,
            frames_sent: 0,
            frames_dropped: 0,
        }
    }

    /// Create a channel and open it.
    pub async fn open(connector: &dyn Connector, url: &str, timeout: Duration) -> Result<Self, ConnectError> {
        let mut channel = Self::new(url);
        channel.connect(connector, timeout).await?;
        Ok(channel)
    }

    /// Perform the handshake, failing with `ConnectError::Timeout` past `timeout`.
    pub async fn connect(&mut self, connector: &dyn Connector, timeout: Duration) -> Result<(), ConnectError> {
        if self.state != ConnectionState::Idle {
            return Err(ConnectError::Handshake {
                url: self.url.clone(),
                message: format!("channel is {}", self.state),
            });
        }

        self.state = ConnectionState::Connecting;
        debug!("Opening transport to {} (timeout {:?})", self.url, timeout);

        let result = match tokio::time::timeout(timeout, connector.connect(&self.url)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout {
                url: self.url.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(link) => {
                self.outbound = Some(link.outbound);
                self.inbound = Some(link.inbound);
                self.state = ConnectionState::Open;
                info!("Transport open: {}", self.url);
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Take the incoming event stream. Only the first caller gets it.
    pub fn subscribe(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.inbound.take()
    }

    /// Send one binary frame, or drop it.
    pub fn send(&mut self, frame: Vec<u8>) -> SendOutcome {
        let outbound = match (&self.state, &self.outbound) {
            (ConnectionState::Open, Some(outbound)) => outbound,
            _ => {
                self.frames_dropped += 1;
                return SendOutcome::NotOpen;
            }
        };

        match outbound.try_send(frame) {
            Ok(()) => {
                self.frames_sent += 1;
                SendOutcome::Sent
            }
            Err(TrySendError::Full(_)) => {
                self.frames_dropped += 1;
                SendOutcome::Busy
            }
            Err(TrySendError::Closed(_)) => {
                // Writer is gone; the link's close event follows
                self.frames_dropped += 1;
                self.state = ConnectionState::Closed;
                SendOutcome::NotOpen
            }
        }
    }

    /// Close the channel.
    ///
    /// Returns `true` only for the call that performed the transition, so the
    /// close is observed exactly once however often this is called.
    pub fn close(&mut self) -> bool {
        let had_link = self.outbound.take().is_some();
        self.inbound = None;

        if self.state == ConnectionState::Closed && !had_link {
            return false;
        }

        self.state = ConnectionState::Closed;
        info!(
            "Transport closed: {} (sent={}, dropped={})",
            self.url, self.frames_sent, self.frames_dropped
        );
        true
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.close();
    }
}
