//! Push-channel transport.
//!
//! [`SocketTransport`] is the seam between the connection supervisor and
//! the wire.  The production implementation speaks WebSocket via
//! tokio-tungstenite; tests drive the supervisor with scripted fakes.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chorus_shared::protocol::{ClientFrame, ServerFrame};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SocketError {
    /// The server rejected our credentials during the handshake.
    #[error("push channel rejected authentication")]
    AuthRejected,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound half of a live connection.
#[async_trait]
pub trait SocketSink: Send {
    async fn send_frame(&mut self, frame: &ClientFrame) -> Result<(), SocketError>;
    async fn close(&mut self);
}

/// Inbound half of a live connection.  `None` means the peer closed.
#[async_trait]
pub trait SocketStream: Send {
    async fn next_frame(&mut self) -> Option<Result<ServerFrame, SocketError>>;
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    /// Open a connection authenticated with `access_token`.
    async fn connect(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<(Box<dyn SocketSink>, Box<dyn SocketStream>), SocketError>;
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsTransport;

#[async_trait]
impl SocketTransport for WsTransport {
    async fn connect(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<(Box<dyn SocketSink>, Box<dyn SocketStream>), SocketError> {
        let request = format!("{url}?token={access_token}")
            .into_client_request()
            .map_err(|e| SocketError::Connect(e.to_string()))?;

        let (ws, _response) = match connect_async(request).await {
            Ok(ok) => ok,
            Err(WsError::Http(resp))
                if resp.status() == StatusCode::UNAUTHORIZED
                    || resp.status() == StatusCode::FORBIDDEN =>
            {
                return Err(SocketError::AuthRejected);
            }
            Err(e) => return Err(SocketError::Connect(e.to_string())),
        };

        tracing::debug!(url, "push channel connected");
        let (sink, stream) = ws.split();
        Ok((
            Box::new(WsSinkHalf { sink }),
            Box::new(WsStreamHalf { stream }),
        ))
    }
}

struct WsSinkHalf {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl SocketSink for WsSinkHalf {
    async fn send_frame(&mut self, frame: &ClientFrame) -> Result<(), SocketError> {
        let json = frame
            .to_json()
            .map_err(|e| SocketError::Transport(e.to_string()))?;
        self.sink
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!(error = %e, "push channel close failed");
        }
    }
}

struct WsStreamHalf {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl SocketStream for WsStreamHalf {
    async fn next_frame(&mut self) -> Option<Result<ServerFrame, SocketError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => match ServerFrame::from_json(text.as_str()) {
                    Ok(frame) => return Some(Ok(frame)),
                    Err(e) => {
                        // Tolerate unknown events from newer servers.
                        tracing::warn!(error = %e, "ignoring malformed push frame");
                    }
                },
                Ok(WsMessage::Close(_)) => return None,
                // Ping/pong is handled by tungstenite; binary frames are
                // not part of the protocol.
                Ok(_) => {}
                Err(e) => return Some(Err(SocketError::Transport(e.to_string()))),
            }
        }
    }
}
