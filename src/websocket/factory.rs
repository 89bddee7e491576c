use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket factory for creating WebSocket connections
pub struct WebSocketFactory;

impl WebSocketFactory {
    /// Opens a WebSocket connection, TLS included for `wss://` URLs
    pub async fn create(url: &str) -> Result<WsStream, WsError> {
        tracing::debug!("Creating WebSocket connection to: {}", url);
        let (ws_stream, response) = connect_async(url).await?;
        tracing::debug!("WebSocket handshake completed: {}", response.status());
        Ok(ws_stream)
    }
}
