use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::{ConnectError, TransportError};
use crate::protocol::WireMessage;

/// Outgoing frames a link holds before further sends are dropped
pub const OUTBOUND_DEPTH: usize = 1;

/// Events delivered by an open link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Message(WireMessage),
    Error(TransportError),
    Closed,
}

/// An open duplex connection, as two channels.
///
/// Dropping `outbound` closes the connection.
pub struct Link {
    pub outbound: mpsc::Sender<Vec<u8>>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens duplex connections to the voice service
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Resolve once the handshake with `url` has completed
    async fn connect(&self, url: &str) -> Result<Link, ConnectError>;
}

/// WebSocket connector
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, ConnectError> {
        info!("Connecting to {}", url);

        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| ConnectError::Handshake {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        info!("Connected to {}", url);

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_DEPTH);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let writer_events = inbound_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Binary(frame)).await {
                    let _ = writer_events.send(LinkEvent::Error(TransportError::Failed(e.to_string())));
                    return;
                }
            }

            debug!("Outbound side dropped, closing socket");
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = inbound_tx.closed() => return,
                    next = stream.next() => next,
                };

                let event = match next {
                    Some(Ok(Message::Text(text))) => LinkEvent::Message(WireMessage::Text(text)),
                    Some(Ok(Message::Binary(bytes))) => LinkEvent::Message(WireMessage::Binary(bytes)),
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Remote sent close frame: {:?}", frame);
                        let _ = inbound_tx.send(LinkEvent::Closed);
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Socket read failed: {}", e);
                        let _ = inbound_tx.send(LinkEvent::Error(TransportError::Failed(e.to_string())));
                        return;
                    }
                    None => {
                        let _ = inbound_tx.send(LinkEvent::Closed);
                        return;
                    }
                };

                if inbound_tx.send(event).is_err() {
                    return;
                }
            }
        });

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
