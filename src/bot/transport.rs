//! Transport seam between a bot connection and its socket.
//!
//! [`Transport`] abstracts the duplex frame stream so the connection logic
//! can be driven by the real WebSocket in production and by
//! [`MockTransport`](super::mock::MockTransport) in tests.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::ServerConfig;

/// Transport-level failure. Fatal to the owning connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// WebSocket protocol or socket error.
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,
}

/// A connected duplex frame stream.
///
/// `recv` returning `None` means the peer closed the stream; `Some(Err(_))`
/// is a transport fault. Both are connection-fatal to the caller.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;
    async fn close(&mut self);
}

/// WebSocket transport over the server's framed entry endpoint.
pub struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Open a socket to a randomly-selected entry endpoint.
    ///
    /// The path segments are random identifiers chosen per-connection; the
    /// server uses them to distribute connections across workers.
    pub async fn connect(server: &ServerConfig) -> Result<Self, TransportError> {
        let url = entry_url(server);
        tracing::debug!(%url, "opening websocket");
        let (ws, _response) = connect_async(url.as_str()).await?;
        Ok(Self { ws })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.ws.send(Message::Text(frame)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Control frames carry no protocol messages.
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Build the WebSocket URL for one fresh connection.
fn entry_url(server: &ServerConfig) -> String {
    const TAIL_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::rng();
    let worker = rng.random_range(100..1000);
    let session: String = (0..8)
        .map(|_| TAIL_CHARSET[rng.random_range(0..TAIL_CHARSET.len())] as char)
        .collect();

    let scheme = if server.tls { "wss" } else { "ws" };
    format!(
        "{scheme}://{}:{}{}/{worker}/{session}/websocket",
        server.host, server.port, server.ws_path
    )
}
