use crate::client::{ClientState, ConnectionManager, SocketState};
use crate::messaging::SystemEvent;
use crate::types::constants::{HEARTBEAT_INTERVAL, PHOENIX_TOPIC};
use crate::types::message::RealtimeMessage;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time;

/// Periodic `heartbeat` on the `phoenix` topic with reply-timeout detection.
///
/// A heartbeat still unanswered at the next tick means the socket is dead: it is
/// closed and watchers are told, which hands control to the reconnect loop.
pub struct HeartbeatManager {
    interval: Duration,
    connection: Weak<ConnectionManager>,
    state: Arc<RwLock<ClientState>>,
}

impl HeartbeatManager {
    pub fn new(connection: Weak<ConnectionManager>, state: Arc<RwLock<ClientState>>) -> Self {
        Self {
            interval: Duration::from_millis(HEARTBEAT_INTERVAL),
            connection,
            state,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawns the heartbeat loop on the client's task manager
    pub async fn spawn_on(self, state: &Arc<RwLock<ClientState>>) {
        state.write().await.task_manager.spawn(self.run());
    }

    async fn run(self) {
        let mut interval_timer = time::interval(self.interval);
        interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        // First tick completes immediately
        interval_timer.tick().await;

        loop {
            interval_timer.tick().await;

            let Some(connection) = self.connection.upgrade() else {
                // Client dropped, exit heartbeat task
                break;
            };

            if !connection.is_connected().await {
                continue;
            }

            if self.state.read().await.pending_heartbeat_ref.is_some() {
                tracing::warn!("Heartbeat timeout detected, closing connection");
                if let Err(e) = connection.close().await {
                    tracing::debug!("Error while closing timed out socket: {}", e);
                }
                let mut state = self.state.write().await;
                state.pending_heartbeat_ref = None;
                let manual = state.was_manual_disconnect;
                state.notify_state_change(SocketState::Closed, manual);
                break;
            }

            let new_ref = self.state.write().await.make_ref();

            let heartbeat_msg = RealtimeMessage::new(
                PHOENIX_TOPIC.to_string(),
                SystemEvent::Heartbeat.into(),
                serde_json::json!({}),
            )
            .with_ref(new_ref.clone());

            match connection.send_message(heartbeat_msg).await {
                Ok(_) => {
                    self.state.write().await.pending_heartbeat_ref = Some(new_ref.clone());
                    tracing::debug!("Sent heartbeat with ref {}", new_ref);
                }
                Err(e) => {
                    tracing::error!("Failed to send heartbeat: {}", e);
                }
            }
        }
    }
}
