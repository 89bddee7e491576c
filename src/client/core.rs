use super::{ClientState, ConnectionManager, RealtimeClientBuilder, RealtimeClientOptions, SocketState};
use crate::channel::{RealtimeChannel, RealtimeChannelOptions};
use crate::infrastructure::{HeartbeatManager, Timer};
use crate::messaging::{ChannelEvent, MessageRouter};
use crate::types::constants::{
    DEFAULT_TIMEOUT, HEARTBEAT_INTERVAL, TOPIC_PREFIX, VSN, channel_events,
};
use crate::types::{RealtimeError, RealtimeMessage, Result};
use crate::websocket::WebSocketFactory;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// WebSocket client for the hosted backend's realtime service.
///
/// `RealtimeClient` owns the socket, keeps it alive with heartbeats, reopens it with
/// stepped backoff after unexpected closes, and hands out channels.
///
/// # Example
///
/// ```no_run
/// use ledger_realtime::{RealtimeClient, RealtimeClientOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RealtimeClient::new(
///     "wss://your-project.supabase.co/realtime/v1",
///     RealtimeClientOptions {
///         api_key: "your-anon-key".to_string(),
///         ..Default::default()
///     }
/// )?;
///
/// client.connect().await?;
/// // Use the client...
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    pub(crate) endpoint: String,
    pub(crate) options: RealtimeClientOptions,

    // Connection manager
    pub(crate) connection: Arc<ConnectionManager>,

    // Consolidated mutable state
    pub(crate) state: Arc<RwLock<ClientState>>,
}

impl RealtimeClient {
    /// Creates a new RealtimeClient instance.
    ///
    /// This does not open the socket; call [`connect()`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Auth`] when no API key is given and
    /// [`RealtimeError::UrlParse`] when the endpoint is malformed.
    pub fn new(endpoint: impl Into<String>, options: RealtimeClientOptions) -> Result<Self> {
        RealtimeClientBuilder::new(endpoint, options).map(|builder| builder.build())
    }

    /// Set connection state and notify watchers
    async fn set_state(&self, new_state: SocketState) {
        self.connection.set_state(new_state).await;

        let state = self.state.read().await;
        state.notify_state_change(new_state, state.was_manual_disconnect);
    }

    /// Set manual disconnect flag and notify watchers
    async fn set_manual_disconnect(&self, manual: bool) {
        let mut state = self.state.write().await;
        state.was_manual_disconnect = manual;

        let conn_state = self.connection.state().await;
        state.notify_state_change(conn_state, manual);
    }

    /// Rejoins every channel that was joined before the socket dropped
    pub async fn resubscribe_all_channels(&self) -> Result<()> {
        let channels = self.state.read().await.channels.clone();
        for channel in channels.iter() {
            if channel.wants_join().await {
                channel.subscribe().await?;
            }
        }
        Ok(())
    }

    /// Marks joined channels as errored after the socket went away
    pub(crate) async fn fail_joined_channels(&self) {
        let channels = self.state.read().await.channels.clone();
        for channel in channels.iter() {
            channel.handle_socket_closed().await;
        }
    }

    /// Reconnects with stepped backoff until the socket is open again.
    pub async fn try_reconnect(&self) -> Result<()> {
        if self.state.read().await.was_manual_disconnect {
            tracing::info!("Manual disconnect detected, will not attempt to reconnect");
            return Ok(());
        }

        let mut timer = Timer::default();
        loop {
            {
                let state = self.connection.state().await;
                if state == SocketState::Open || state == SocketState::Connecting {
                    tracing::info!(
                        "Already connected or connecting, stopping reconnection attempts"
                    );
                    break;
                }
            }
            if self.state.read().await.was_manual_disconnect {
                break;
            }

            tracing::info!("Attempting to reconnect...");
            match self.connect().await {
                Ok(_) => {
                    tracing::info!("Reconnected successfully");
                    self.resubscribe_all_channels().await?;
                    break;
                }
                Err(e) => {
                    tracing::error!("Reconnection attempt failed: {}", e);
                    timer.schedule_timeout().await;
                }
            }
        }
        Ok(())
    }

    /// Opens the WebSocket, starts the read loop and the heartbeat.
    ///
    /// Returns immediately if the socket is already open or opening.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL is invalid or the WebSocket handshake
    /// (including TLS) fails.
    pub async fn connect(&self) -> Result<()> {
        {
            let state = self.connection.state().await;
            if state == SocketState::Open || state == SocketState::Connecting {
                return Ok(());
            }
        }
        self.set_state(SocketState::Connecting).await;

        let url = self.build_endpoint_url()?;
        tracing::info!("Connecting to {}", &self.endpoint);

        let ws_stream = match WebSocketFactory::create(&url).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                // Quietly back to Closed; the reconnect loop owns retries
                self.connection.set_state(SocketState::Closed).await;
                return Err(e.into());
            }
        };
        let (write_half, mut read_half) = ws_stream.split();

        self.connection.set_writer(write_half).await;

        let router = MessageRouter::new(Arc::clone(&self.state));

        let self_cloned = self.clone();
        {
            let mut state = self.state.write().await;
            state.task_manager.abort_all();
            state.pending_heartbeat_ref = None;
            state.task_manager.spawn(async move {
                tracing::info!("Starting read task");
                while let Some(msg_result) = read_half.next().await {
                    match msg_result {
                        Ok(Message::Text(text)) => {
                            tracing::debug!("Received text message: {}", text);
                            match serde_json::from_str::<RealtimeMessage>(&text) {
                                Ok(realtime_msg) => router.route(realtime_msg).await,
                                Err(e) => {
                                    tracing::error!(
                                        "Failed to parse message: {} - Raw: {}",
                                        e,
                                        text
                                    );
                                }
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            if let Some(close_frame) = frame {
                                tracing::warn!(
                                    "Server closed connection: code={:?}, reason='{}'",
                                    close_frame.code,
                                    close_frame.reason
                                );
                            } else {
                                tracing::warn!("Server closed connection without close frame");
                            }
                            break;
                        }
                        Ok(Message::Ping(data)) => {
                            tracing::debug!("Received ping ({} bytes)", data.len());
                        }
                        Ok(Message::Pong(data)) => {
                            tracing::debug!("Received pong ({} bytes)", data.len());
                        }
                        Ok(Message::Binary(data)) => {
                            tracing::warn!(
                                "Received unexpected binary message ({} bytes)",
                                data.len()
                            );
                        }
                        Ok(Message::Frame(_)) => {
                            tracing::debug!("Received raw frame (internal)");
                        }
                        Err(e) => {
                            tracing::error!("WebSocket read error: {}", e);
                            break;
                        }
                    }
                }
                self_cloned.set_state(SocketState::Closed).await;
                tracing::info!("Read task finished");
            });
        }

        let heartbeat_interval = self.options.heartbeat_interval.unwrap_or(HEARTBEAT_INTERVAL);
        HeartbeatManager::new(Arc::downgrade(&self.connection), Arc::clone(&self.state))
            .with_interval(Duration::from_millis(heartbeat_interval))
            .spawn_on(&self.state)
            .await;

        self.set_manual_disconnect(false).await;
        self.set_state(SocketState::Open).await;

        tracing::info!("Connected to WebSocket server");
        Ok(())
    }

    /// Waits until the socket is open, e.g. while another task's
    /// [`connect()`](Self::connect) is still in flight.
    ///
    /// # Errors
    ///
    /// [`RealtimeError::NotConnected`] if the socket closes instead, and
    /// [`RealtimeError::Timeout`] after the push timeout.
    pub async fn wait_until_open(&self) -> Result<()> {
        let mut changes = self
            .state
            .read()
            .await
            .state_change_tx
            .as_ref()
            .map(|tx| tx.subscribe());

        let wait = async {
            loop {
                match self.connection.state().await {
                    SocketState::Open => return Ok(()),
                    SocketState::Closed | SocketState::Closing => {
                        return Err(RealtimeError::NotConnected);
                    }
                    SocketState::Connecting => {}
                }
                // Failed handshakes go back to Closed without a notification
                match changes.as_mut() {
                    Some(rx) => {
                        let _ = tokio::time::timeout(Duration::from_millis(50), rx.changed()).await;
                    }
                    None => tokio::time::sleep(Duration::from_millis(50)).await,
                }
            }
        };

        tokio::time::timeout(self.timeout(), wait)
            .await
            .map_err(|_| RealtimeError::Timeout)?
    }

    /// Creates or retrieves the channel for `topic`.
    ///
    /// The `realtime:` prefix is added automatically. An existing channel with the
    /// same topic is returned as is.
    pub async fn channel(
        &self,
        topic: &str,
        options: RealtimeChannelOptions,
    ) -> Arc<RealtimeChannel> {
        let full_topic = format!("{}{}", TOPIC_PREFIX, topic);

        let mut state = self.state.write().await;
        if let Some(existing_channel) = state.channels.iter().find(|c| c.topic() == full_topic) {
            return Arc::clone(existing_channel);
        }

        let new_channel = Arc::new(RealtimeChannel::new(full_topic, self.clone(), options));
        state.channels.push(Arc::clone(&new_channel));

        new_channel
    }

    /// Creates a channel for `topic` that no other caller shares.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Channel`] if a channel with that topic already
    /// exists on this client.
    pub async fn exclusive_channel(
        &self,
        topic: &str,
        options: RealtimeChannelOptions,
    ) -> Result<Arc<RealtimeChannel>> {
        let full_topic = format!("{}{}", TOPIC_PREFIX, topic);

        let mut state = self.state.write().await;
        if state.channels.iter().any(|c| c.topic() == full_topic) {
            return Err(RealtimeError::Channel(format!(
                "{} is already open on this client",
                full_topic
            )));
        }

        let new_channel = Arc::new(RealtimeChannel::new(full_topic, self.clone(), options));
        state.channels.push(Arc::clone(&new_channel));

        Ok(new_channel)
    }

    /// Leaves the channel with the given full topic and forgets it.
    ///
    /// Unknown topics are ignored.
    pub async fn remove_channel(&self, full_topic: &str) -> Result<()> {
        let removed = {
            let mut state = self.state.write().await;
            let position = state.channels.iter().position(|c| c.topic() == full_topic);
            position.map(|index| state.channels.remove(index))
        };

        match removed {
            Some(channel) => channel.unsubscribe().await,
            None => Ok(()),
        }
    }

    /// All channels currently owned by this client
    pub async fn channels(&self) -> Vec<Arc<RealtimeChannel>> {
        self.state.read().await.channels.clone()
    }

    /// Closes the socket and stops background tasks.
    ///
    /// A manual disconnect disables automatic reconnection until the next
    /// [`connect()`](Self::connect).
    pub async fn disconnect(&self) -> Result<()> {
        {
            let state = self.connection.state().await;
            if state == SocketState::Closed {
                return Ok(());
            }
        }

        self.set_manual_disconnect(true).await;
        tracing::info!("Disconnecting from WebSocket server");

        {
            let mut state = self.state.write().await;
            state.task_manager.abort_all();
            state.pending_heartbeat_ref = None;
        }

        let result = self.connection.close().await;
        self.set_state(SocketState::Closed).await;

        tracing::info!("Disconnected from WebSocket server");
        result
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    pub async fn socket_state(&self) -> SocketState {
        self.connection.state().await
    }

    /// Build the WebSocket endpoint URL with query parameters
    pub(crate) fn build_endpoint_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.endpoint)?;

        if !url.path().ends_with("/websocket") {
            let path = format!("{}/websocket", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }

        url.query_pairs_mut()
            .append_pair("apikey", &self.options.api_key)
            .append_pair("vsn", VSN);

        Ok(url.to_string())
    }

    /// Generate next message reference
    pub async fn make_ref(&self) -> String {
        self.state.write().await.make_ref()
    }

    /// Push a message to the server
    pub async fn push(&self, message: RealtimeMessage) -> Result<()> {
        if !self.is_connected().await {
            return Err(RealtimeError::NotConnected);
        }

        self.connection.send_message(message).await
    }

    /// Replaces the user token and forwards it to every joined channel.
    pub async fn set_access_token(&self, token: Option<String>) -> Result<()> {
        let channels = {
            let mut state = self.state.write().await;
            state.access_token = token.clone();
            state.channels.clone()
        };

        let Some(token) = token else {
            return Ok(());
        };
        if !self.is_connected().await {
            return Ok(());
        }

        for channel in channels {
            if !channel.wants_join().await {
                continue;
            }
            let message = RealtimeMessage::new(
                channel.topic().to_string(),
                ChannelEvent::Custom(channel_events::ACCESS_TOKEN.to_string()),
                serde_json::json!({ "access_token": token }),
            )
            .with_ref(self.make_ref().await);
            self.push(message).await?;
        }
        Ok(())
    }

    /// Push reply timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.options.timeout.unwrap_or(DEFAULT_TIMEOUT))
    }

    /// HTTP endpoint matching the socket endpoint (for REST reads)
    pub fn http_endpoint(&self) -> String {
        crate::infrastructure::ws_to_http_endpoint(&self.endpoint)
    }

    pub fn api_key(&self) -> &str {
        &self.options.api_key
    }

    pub async fn access_token(&self) -> Option<String> {
        self.state.read().await.access_token.clone()
    }
}
