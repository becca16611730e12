//! In-process transport
//!
//! Every `connect` creates a channel pair and hands the server end to the matching
//! `MemoryServer`, which plays the gateway. Used by tests and for embedding a shard
//! behind a custom relay.

use super::{CloseFrame, Frame, GatewayConnection, GatewayTransport, TransportEvent};
use crate::error::TransportError;
use crate::protocol::GatewayMessage;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Client side factory
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    accept_tx: mpsc::UnboundedSender<MemoryServerConnection>,
}

/// Accepts the connections opened through a `MemoryTransport`
#[derive(Debug)]
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryServerConnection>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (Self { accept_tx }, MemoryServer { accept_rx })
    }
}

impl MemoryServer {
    /// Next connection opened by a client; `None` once every transport is dropped
    pub async fn accept(&mut self) -> Option<MemoryServerConnection> {
        self.accept_rx.recv().await
    }

    /// A connection that was already opened, without waiting
    pub fn try_accept(&mut self) -> Option<MemoryServerConnection> {
        self.accept_rx.try_recv().ok()
    }
}

#[async_trait]
impl GatewayTransport for MemoryTransport {
    type Connection = MemoryConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError> {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();

        let server = MemoryServerConnection {
            url: url.to_string(),
            to_client,
            from_client,
        };
        self.accept_tx
            .send(server)
            .map_err(|_| TransportError::Connect("connection refused".to_string()))?;

        Ok(MemoryConnection {
            outbound,
            inbound,
            closed: false,
        })
    }
}

/// Client end of an in-process connection
#[derive(Debug)]
pub struct MemoryConnection {
    outbound: mpsc::UnboundedSender<TransportEvent>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    closed: bool,
}

#[async_trait]
impl GatewayConnection for MemoryConnection {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(TransportEvent::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    async fn receive(&mut self) -> Option<Result<TransportEvent, TransportError>> {
        if self.closed {
            return None;
        }
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        // The server may already be gone
        let _ = self.outbound.send(TransportEvent::Close(Some(CloseFrame {
            code,
            reason: reason.to_string(),
        })));
        Ok(())
    }
}

/// Server end of an in-process connection
#[derive(Debug)]
pub struct MemoryServerConnection {
    url: String,
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<TransportEvent>,
}

impl MemoryServerConnection {
    /// URL the client connected to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a message as a JSON text frame; false if the client is gone
    pub fn send(&self, message: &GatewayMessage) -> bool {
        match message.to_json() {
            Ok(json) => self.send_frame(Frame::Text(json)),
            Err(_) => false,
        }
    }

    /// Send a raw frame; false if the client is gone
    pub fn send_frame(&self, frame: Frame) -> bool {
        self.to_client.send(TransportEvent::Frame(frame)).is_ok()
    }

    /// Close the connection with a close frame
    pub fn close(self, code: u16, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Close(Some(CloseFrame {
            code,
            reason: reason.to_string(),
        })));
    }

    /// Next event from the client; `None` once the client end is dropped
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.from_client.recv().await
    }

    /// Next message from the client; `None` on close or if the client end is gone
    ///
    /// Frames that do not decode are skipped.
    pub async fn recv_message(&mut self) -> Option<GatewayMessage> {
        loop {
            match self.recv().await? {
                TransportEvent::Frame(Frame::Text(text)) => {
                    if let Ok(message) = GatewayMessage::from_json(&text) {
                        return Some(message);
                    }
                }
                TransportEvent::Frame(Frame::Binary(bytes)) => {
                    if let Ok(message) = serde_json::from_slice(&bytes) {
                        return Some(message);
                    }
                }
                TransportEvent::Close(_) => return None,
            }
        }
    }

    /// Next event without waiting
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.from_client.try_recv().ok()
    }
}
