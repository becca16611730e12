//! Connection boundary
//!
//! A shard only needs to open a connection, send frames, receive frames and close
//! frames, and close. `WsTransport` does this over WebSocket; `MemoryTransport` does it
//! over in-process channels.

mod memory;
mod websocket;

pub use memory::{MemoryServer, MemoryServerConnection, MemoryTransport};
pub use websocket::{WsConnection, WsTransport};

use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;

/// A data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Close frame with its code and reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

/// What the remote end sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Frame),
    /// The remote end closed the connection, with a close frame if it sent one
    Close(Option<CloseFrame>),
}

/// Opens gateway connections
#[async_trait]
pub trait GatewayTransport: Send + Sync + 'static {
    type Connection: GatewayConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError>;
}

#[async_trait]
impl<T: GatewayTransport + ?Sized> GatewayTransport for Arc<T> {
    type Connection = T::Connection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError> {
        (**self).connect(url).await
    }
}

/// One open connection
#[async_trait]
pub trait GatewayConnection: Send + 'static {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Next event from the remote end; `None` once the connection has ended
    ///
    /// Must be cancel-safe: dropping the future before it completes loses no frame.
    async fn receive(&mut self) -> Option<Result<TransportEvent, TransportError>>;

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}
