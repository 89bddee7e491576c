use crate::types::{Result, message::RealtimeMessage};
use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// State of the underlying WebSocket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Owns the write half of the socket and its state.
pub struct ConnectionManager {
    ws_write: RwLock<Option<WsWriter>>,
    state: RwLock<SocketState>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            ws_write: RwLock::new(None),
            state: RwLock::new(SocketState::Closed),
        }
    }

    /// Sets the WebSocket write sink (called after successful connection)
    pub async fn set_writer(&self, writer: WsWriter) {
        *self.ws_write.write().await = Some(writer);
    }

    pub async fn state(&self) -> SocketState {
        *self.state.read().await
    }

    pub async fn set_state(&self, new_state: SocketState) {
        *self.state.write().await = new_state;
    }

    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == SocketState::Open
    }

    /// Sends a message through the WebSocket connection
    pub async fn send_message(&self, msg: RealtimeMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        tracing::debug!("Sending frame: {}", json);

        let mut ws_guard = self.ws_write.write().await;
        if let Some(ws) = ws_guard.as_mut() {
            ws.send(Message::Text(json.into())).await?;
        }

        Ok(())
    }

    /// Closes the WebSocket connection gracefully
    pub async fn close(&self) -> Result<()> {
        self.set_state(SocketState::Closing).await;

        let result = {
            let mut ws_guard = self.ws_write.write().await;
            let result = match ws_guard.as_mut() {
                Some(ws) => ws.close().await,
                None => Ok(()),
            };
            *ws_guard = None;
            result
        };

        self.set_state(SocketState::Closed).await;

        result.map_err(Into::into)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
