//! WebSocket transport

use super::{CloseFrame, Frame, GatewayConnection, GatewayTransport, TransportEvent};
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// `tokio-tungstenite` client
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl GatewayTransport for WsTransport {
    type Connection = WsConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(url = %url, "WebSocket connection established");

        Ok(WsConnection { stream })
    }
}

/// Open WebSocket connection
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl GatewayConnection for WsConnection {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
        };

        self.stream.send(message).await.map_err(map_ws_error)
    }

    async fn receive(&mut self) -> Option<Result<TransportEvent, TransportError>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(TransportEvent::Frame(Frame::Text(text)))),
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(TransportEvent::Frame(Frame::Binary(bytes))));
                }
                Ok(Message::Close(frame)) => {
                    let frame = frame.map(|f| CloseFrame {
                        code: u16::from(f.code),
                        reason: f.reason.into_owned(),
                    });
                    return Some(Ok(TransportEvent::Close(frame)));
                }
                // Pongs are queued by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(map_ws_error(e))),
            }
        }

        None
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = WsCloseFrame {
            code: WsCloseCode::from(code),
            reason: reason.to_string().into(),
        };

        match self.stream.close(Some(frame)).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

fn map_ws_error(error: WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::Io(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(map_ws_error(WsError::AlreadyClosed), TransportError::Closed));
        assert!(matches!(
            map_ws_error(WsError::Utf8),
            TransportError::Io(_)
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 9 (discard) on localhost is normally closed
        let result = WsTransport.connect("ws://127.0.0.1:9/?v=10&encoding=json").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
