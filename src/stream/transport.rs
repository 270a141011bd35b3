//! Transport seam for the streaming client. Production uses a WebSocket;
//! tests plug in a channel-backed fake.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::envelope::{InboundEnvelope, OutboundEnvelope};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection attempt timed out")]
    ConnectTimeout,
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// One live connection to the transcription service.
#[async_trait]
pub trait StreamConnection: Send {
    async fn send(&mut self, envelope: &OutboundEnvelope) -> Result<(), StreamError>;

    /// Next inbound envelope. `None` means the peer closed the connection.
    async fn recv(&mut self) -> Option<Result<InboundEnvelope, StreamError>>;
}

/// Factory for connections; owns the remote endpoint details.
#[async_trait]
pub trait StreamTransport: Send {
    async fn connect(&mut self) -> Result<Box<dyn StreamConnection>, StreamError>;
}

/// WebSocket transport speaking JSON text frames.
pub struct WsTransport {
    url: String,
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn connect(&mut self) -> Result<Box<dyn StreamConnection>, StreamError> {
        let (ws, _response) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| StreamError::ConnectTimeout)?
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        debug!(url = %self.url, "websocket connection established");
        Ok(Box::new(WsConnection { ws }))
    }
}

struct WsConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamConnection for WsConnection {
    async fn send(&mut self, envelope: &OutboundEnvelope) -> Result<(), StreamError> {
        let text =
            serde_json::to_string(envelope).map_err(|e| StreamError::Protocol(e.to_string()))?;
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<InboundEnvelope, StreamError>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(
                        serde_json::from_str(text.as_str())
                            .map_err(|e| StreamError::Protocol(e.to_string())),
                    );
                }
                Ok(Message::Close(_)) => return None,
                // Pings and pongs are handled by tungstenite; binary frames
                // are not part of the protocol.
                Ok(_) => continue,
                Err(e) => return Some(Err(StreamError::Transport(e.to_string()))),
            }
        }
    }
}
