use super::{ClientState, ConnectionManager, RealtimeClient, SocketState};
use crate::types::{RealtimeError, Result};
use std::sync::Arc;
use tokio::sync::{RwLock, watch};

#[derive(Debug, Clone)]
pub struct RealtimeClientOptions {
    pub api_key: String,
    /// Push reply timeout in milliseconds
    pub timeout: Option<u64>,
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: Option<u64>,
    pub access_token: Option<String>,
    /// Reopen the socket with stepped backoff after an unexpected close
    pub auto_reconnect: bool,
}

impl Default for RealtimeClientOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            timeout: None,
            heartbeat_interval: None,
            access_token: None,
            auto_reconnect: true,
        }
    }
}

/// Builder for RealtimeClient that handles initialization
pub struct RealtimeClientBuilder {
    endpoint: String,
    options: RealtimeClientOptions,
}

impl RealtimeClientBuilder {
    /// Create a new builder
    pub fn new(endpoint: impl Into<String>, options: RealtimeClientOptions) -> Result<Self> {
        let endpoint = endpoint.into();

        if options.api_key.is_empty() {
            return Err(RealtimeError::Auth("API key is required".to_string()));
        }
        url::Url::parse(&endpoint)?;

        Ok(Self { endpoint, options })
    }

    /// Build the client and spawn the socket watcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> RealtimeClient {
        let mut client_state = ClientState::new(self.options.access_token.clone());

        let (state_tx, state_rx) = watch::channel((SocketState::Closed, false));
        client_state.state_change_tx = Some(state_tx);

        let client = RealtimeClient {
            endpoint: self.endpoint,
            options: self.options,
            connection: Arc::new(ConnectionManager::new()),
            state: Arc::new(RwLock::new(client_state)),
        };

        let client_for_watcher = client.clone();
        tokio::spawn(async move {
            let mut rx = state_rx;

            while rx.changed().await.is_ok() {
                let (state, was_manual) = *rx.borrow_and_update();
                if state != SocketState::Closed {
                    continue;
                }
                // A late close notice from a socket that has since been replaced
                if client_for_watcher.socket_state().await != SocketState::Closed {
                    continue;
                }

                client_for_watcher.fail_joined_channels().await;

                if !was_manual && client_for_watcher.options.auto_reconnect {
                    tracing::info!("State watcher detected disconnect, attempting reconnection...");

                    if let Err(e) = client_for_watcher.try_reconnect().await {
                        tracing::error!("Reconnection watcher failed: {}", e);
                    }
                }
            }
            tracing::info!("Socket watcher task finished");
        });

        client
    }
}
