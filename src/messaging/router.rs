use super::{ChannelEvent, SystemEvent};
use crate::client::ClientState;
use crate::types::constants::{PHOENIX_TOPIC, reply_status};
use crate::types::message::RealtimeMessage;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Routes incoming messages to appropriate handlers
pub struct MessageRouter {
    state: Arc<RwLock<ClientState>>,
}

impl MessageRouter {
    pub fn new(state: Arc<RwLock<ClientState>>) -> Self {
        Self { state }
    }

    /// Routes a message to the appropriate handler(s)
    pub async fn route(&self, message: RealtimeMessage) {
        if message.topic == PHOENIX_TOPIC {
            self.handle_heartbeat_ack(&message).await;
            return;
        }

        if message.event == ChannelEvent::System(SystemEvent::Reply) {
            if !self.handle_push_reply(&message).await {
                tracing::debug!(
                    "Unmatched reply on {} for ref {:?}",
                    message.topic,
                    message.r#ref
                );
            }
            return;
        }

        self.route_to_channels(message).await;
    }

    /// Handles heartbeat acknowledgment by clearing pending ref
    async fn handle_heartbeat_ack(&self, message: &RealtimeMessage) {
        let Some(msg_ref) = &message.r#ref else {
            return;
        };

        let mut state = self.state.write().await;
        if state.pending_heartbeat_ref.as_ref() == Some(msg_ref) {
            state.pending_heartbeat_ref = None;
            tracing::debug!("Received heartbeat ack for ref {}", msg_ref);
        }
    }

    /// Handles push reply by matching ref to pending push
    /// Returns true if reply was handled
    async fn handle_push_reply(&self, message: &RealtimeMessage) -> bool {
        let Some(ref_id) = &message.r#ref else {
            return false;
        };

        let channel = {
            let state = self.state.read().await;
            state
                .channels
                .iter()
                .find(|ch| ch.topic() == message.topic)
                .cloned()
        };

        let Some(channel) = channel else {
            return false;
        };

        let status = message.reply_status().unwrap_or_else(|| {
            tracing::debug!("Push reply missing 'status' field, defaulting to 'error'");
            reply_status::ERROR
        });

        let response = message
            .payload
            .get("response")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let handled = channel.resolve_reply(ref_id, status, response).await;
        if handled {
            tracing::debug!(
                "Handled push reply for ref {} with status {}",
                ref_id,
                status
            );
        }
        handled
    }

    /// Routes message to matching channels
    async fn route_to_channels(&self, message: RealtimeMessage) {
        let channels: Vec<_> = {
            let state = self.state.read().await;
            state
                .channels
                .iter()
                .filter(|channel| channel.topic() == message.topic)
                .cloned()
                .collect()
        };

        if channels.is_empty() {
            tracing::debug!(
                "No channel for topic {} (event {})",
                message.topic,
                message.event
            );
        }

        for channel in channels {
            tracing::debug!(
                "Triggering event {} on channel {}",
                message.event,
                channel.topic()
            );
            channel
                .trigger(message.event.clone(), message.payload.clone())
                .await;
        }
    }
}
