//! Transport seam between the connection manager and the network.
//!
//! [`Connector`] opens a [`Transport`]; the connection manager owns the
//! transport exclusively from then on. The production pair wraps
//! `tokio-tungstenite`; tests substitute scripted doubles.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use lookout_core::StreamError;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::trace;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens transports to a stream URL.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport. Resolves once the connection is established.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, StreamError>;
}

/// An open, exclusively owned stream connection.
#[async_trait]
pub trait Transport: Send {
    /// Next text payload. `Ok(None)` means the peer closed the stream.
    async fn next_text(&mut self) -> Result<Option<String>, StreamError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// [`Connector`] over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, StreamError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| StreamError::Connect {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(WsTransport { ws }))
    }
}

/// WebSocket transport. Only text frames are surfaced.
pub struct WsTransport {
    ws: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn next_text(&mut self) -> Result<Option<String>, StreamError> {
        while let Some(msg) = self.ws.next().await {
            match msg.map_err(|e| StreamError::Transport(e.to_string()))? {
                Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                Message::Close(frame) => {
                    trace!(?frame, "close frame received");
                    return Ok(None);
                }
                // tungstenite answers pings itself
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.ws
            .close(None)
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))
    }
}
