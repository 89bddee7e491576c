use super::{
    PostgresChangesFilter, PostgresChangesPayload,
    config::{ChannelJoinConfig, JoinPayload},
    push::{Push, PushReply},
    state::{
        ChannelLifecycle, ChannelState, ChannelStatus, ChannelUpdate, EventBinding, FeedBinding,
    },
};
use crate::client::RealtimeClient;
use crate::messaging::{ChannelEvent, SystemEvent};
use crate::types::constants::{BINDING_BUFFER_SIZE, channel_events, reply_status};
use crate::types::{RealtimeMessage, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};

/// Configuration options for a realtime channel.
#[derive(Debug, Clone, Default)]
pub struct RealtimeChannelOptions {
    /// Whether this is a private channel requiring authorization. Default: `false`.
    pub is_private: bool,
}

/// A channel carrying database change events for one topic.
///
/// Register `postgres_changes` bindings with
/// [`on_postgres_changes()`](Self::on_postgres_changes) and lifecycle listeners
/// with [`lifecycle()`](Self::lifecycle), or both on one ordered queue with
/// [`updates()`](Self::updates), then call [`subscribe()`](Self::subscribe).
///
/// # Example
///
/// ```no_run
/// use ledger_realtime::{
///     PostgresChangeEvent, PostgresChangesFilter, RealtimeClient, RealtimeClientOptions,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let client = RealtimeClient::new(
/// #     "wss://your-project.supabase.co/realtime/v1",
/// #     RealtimeClientOptions {
/// #         api_key: "your-anon-key".to_string(),
/// #         ..Default::default()
/// #     }
/// # )?;
/// # client.connect().await?;
/// let channel = client.channel("expenses-changes-u1", Default::default()).await;
///
/// let mut rx = channel
///     .on_postgres_changes(
///         PostgresChangesFilter::new(PostgresChangeEvent::All, "public")
///             .table("expenses")
///             .filter("user_id=eq.u1"),
///     )
///     .await;
/// let mut status = channel.lifecycle().await;
///
/// channel.subscribe().await?;
///
/// tokio::spawn(async move {
///     while let Some(change) = rx.recv().await {
///         println!("Database change: {:?}", change);
///     }
/// });
/// # Ok(())
/// # }
/// ```
pub struct RealtimeChannel {
    topic: String,
    client: RealtimeClient,
    pub(crate) state: Arc<RwLock<ChannelState>>,
    options: RealtimeChannelOptions,
}

impl RealtimeChannel {
    pub fn new(topic: String, client: RealtimeClient, options: RealtimeChannelOptions) -> Self {
        Self {
            topic,
            client,
            state: Arc::new(RwLock::new(ChannelState::new())),
            options,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn status(&self) -> ChannelStatus {
        self.state.read().await.status
    }

    /// Whether the channel should be joined again after the socket reconnects
    pub async fn wants_join(&self) -> bool {
        self.state.read().await.wants_join
    }

    /// Subscribes to Postgres database changes matching `filter`.
    ///
    /// Bindings must be registered before [`subscribe()`](Self::subscribe); they are
    /// sent to the server in the join payload. The row filter (e.g. `user_id=eq.42`)
    /// is enforced by the server.
    pub async fn on_postgres_changes(
        &self,
        filter: PostgresChangesFilter,
    ) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel(BINDING_BUFFER_SIZE);
        let binding = EventBinding { filter, sender: tx };

        self.state.write().await.bindings.push(binding);

        rx
    }

    /// Registers a listener for join acknowledgements, closes and errors.
    pub async fn lifecycle(&self) -> mpsc::UnboundedReceiver<ChannelLifecycle> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.write().await.lifecycle_listeners.push(tx);
        rx
    }

    /// Registers a listener that receives matching changes and lifecycle
    /// notifications on one queue, in the order the server sent them.
    pub async fn updates(
        &self,
        filter: PostgresChangesFilter,
    ) -> mpsc::UnboundedReceiver<ChannelUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .write()
            .await
            .feeds
            .push(FeedBinding { filter, sender: tx });
        rx
    }

    /// Sends `phx_join` for this topic.
    ///
    /// Returns once the join is on the wire; the server's answer arrives later as
    /// [`ChannelLifecycle::Subscribed`], [`ChannelLifecycle::Errored`] or
    /// [`ChannelLifecycle::TimedOut`]. Subscribing an already joined or joining
    /// channel is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected or the join cannot be sent.
    pub async fn subscribe(self: &Arc<Self>) -> Result<()> {
        let postgres_changes = {
            let state = self.state.read().await;
            if matches!(state.status, ChannelStatus::Joined | ChannelStatus::Joining) {
                return Ok(());
            }
            state
                .bindings
                .iter()
                .map(|b| &b.filter)
                .chain(state.feeds.iter().map(|f| &f.filter))
                .map(|filter| filter.to_config())
                .collect()
        };

        let payload = JoinPayload {
            config: ChannelJoinConfig {
                is_private: self.options.is_private,
                postgres_changes,
                ..Default::default()
            },
            access_token: self.client.access_token().await,
        };
        let payload = serde_json::to_value(&payload)?;

        let join_ref = self.client.make_ref().await;
        let timeout = self.client.timeout();
        let (push, reply_rx) = Push::new(SystemEvent::Join.into(), join_ref.clone(), timeout);

        {
            let mut state = self.state.write().await;
            state.status = ChannelStatus::Joining;
            state.wants_join = true;
            state.join_ref = Some(join_ref.clone());
            state.pending_pushes.insert(join_ref.clone(), push);
        }

        let join_message =
            RealtimeMessage::new(self.topic.clone(), SystemEvent::Join.into(), payload)
                .with_ref(join_ref.clone())
                .with_join_ref(join_ref.clone());

        tracing::info!("Subscribing to channel: {}", self.topic);

        if let Err(e) = self.client.push(join_message).await {
            let mut state = self.state.write().await;
            state.pending_pushes.remove(&join_ref);
            state.status = ChannelStatus::Errored;
            return Err(e);
        }

        tokio::spawn(Arc::clone(self).await_join_reply(join_ref, reply_rx, timeout));

        Ok(())
    }

    /// Expires the join if no reply was routed in time; replies themselves are
    /// applied by [`resolve_reply()`](Self::resolve_reply).
    async fn await_join_reply(
        self: Arc<Self>,
        join_ref: String,
        reply_rx: oneshot::Receiver<PushReply>,
        timeout: Duration,
    ) {
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(_)) => return,
            Ok(Err(_)) => {
                tracing::debug!("Join push for {} dropped before a reply", self.topic);
                return;
            }
            Err(_) => {}
        }

        let mut state = self.state.write().await;
        if state.join_ref.as_deref() != Some(join_ref.as_str())
            || state.status != ChannelStatus::Joining
        {
            // A newer join or a leave replaced this one
            return;
        }

        state.pending_pushes.remove(&join_ref);
        state.status = ChannelStatus::Errored;
        tracing::warn!(
            "Join for channel {} timed out after {:?}",
            self.topic,
            timeout
        );
        state.emit(ChannelLifecycle::TimedOut);
    }

    fn apply_join_reply(
        &self,
        state: &mut ChannelState,
        status: &str,
        response: &serde_json::Value,
    ) {
        if status == reply_status::OK {
            state.status = ChannelStatus::Joined;
            tracing::info!("Joined channel: {}", self.topic);
            state.emit(ChannelLifecycle::Subscribed);
        } else {
            let reason = response
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or(status)
                .to_string();
            state.status = ChannelStatus::Errored;
            tracing::warn!("Join rejected for channel {}: {}", self.topic, reason);
            state.emit(ChannelLifecycle::Errored(reason));
        }
    }

    /// Leaves the channel and stops delivering events.
    ///
    /// When the socket is down the leave is recorded locally only; the server has
    /// already dropped the channel with the connection.
    pub async fn unsubscribe(&self) -> Result<()> {
        let mut state = self.state.write().await;

        if state.status == ChannelStatus::Closed && !state.wants_join {
            return Ok(());
        }

        state.status = ChannelStatus::Leaving;
        state.wants_join = false;
        state.join_ref = None;
        state.pending_pushes.clear();
        drop(state);

        let result = if self.client.is_connected().await {
            let leave_message = RealtimeMessage::new(
                self.topic.clone(),
                SystemEvent::Leave.into(),
                serde_json::json!({}),
            )
            .with_ref(self.client.make_ref().await);
            self.client.push(leave_message).await
        } else {
            Ok(())
        };

        tracing::info!("Unsubscribed from channel: {}", self.topic);

        let mut state = self.state.write().await;
        state.status = ChannelStatus::Closed;
        state.emit(ChannelLifecycle::Closed);

        result
    }

    /// Routes an incoming event to bindings or lifecycle handling
    pub(crate) async fn trigger(&self, event: ChannelEvent, payload: serde_json::Value) {
        match event {
            ChannelEvent::PostgresChanges => self.dispatch_postgres_changes(payload).await,
            ChannelEvent::System(SystemEvent::Close) => self.handle_close().await,
            ChannelEvent::System(SystemEvent::Error) => self.handle_error(&payload).await,
            ChannelEvent::Custom(ref name) if name == channel_events::SYSTEM => {
                self.handle_system_notice(&payload).await
            }
            other => {
                tracing::debug!("Ignoring event {} on channel {}", other, self.topic);
            }
        }
    }

    async fn dispatch_postgres_changes(&self, payload: serde_json::Value) {
        let typed_payload = match PostgresChangesPayload::from_message_payload(&payload) {
            Ok(typed_payload) => typed_payload,
            Err(e) => {
                tracing::warn!(
                    "Failed to deserialize postgres_changes payload on {}: {}. Skipping.",
                    self.topic,
                    e
                );
                return;
            }
        };

        let senders: Vec<_> = {
            let state = self.state.read().await;
            for feed in state
                .feeds
                .iter()
                .filter(|feed| feed.filter.matches(&typed_payload))
            {
                if feed
                    .sender
                    .send(ChannelUpdate::Change(payload.clone()))
                    .is_err()
                {
                    tracing::debug!("Update listener on {} is gone", self.topic);
                }
            }
            state
                .bindings
                .iter()
                .filter(|binding| binding.filter.matches(&typed_payload))
                .map(|binding| binding.sender.clone())
                .collect()
        };

        for sender in senders {
            if let Err(e) = sender.send(payload.clone()).await {
                tracing::warn!(
                    "Failed to deliver postgres change on {}: {}. Listener may be gone.",
                    self.topic,
                    e
                );
            }
        }
    }

    async fn handle_close(&self) {
        let mut state = self.state.write().await;
        state.status = ChannelStatus::Closed;
        state.wants_join = false;
        state.join_ref = None;
        state.pending_pushes.clear();
        tracing::info!("Channel closed by server: {}", self.topic);
        state.emit(ChannelLifecycle::Closed);
    }

    async fn handle_error(&self, payload: &serde_json::Value) {
        let reason = payload
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("channel error")
            .to_string();

        let mut state = self.state.write().await;
        state.status = ChannelStatus::Errored;
        state.pending_pushes.clear();
        tracing::warn!("Channel {} errored: {}", self.topic, reason);
        state.emit(ChannelLifecycle::Errored(reason));
    }

    /// Server notices, e.g. the outcome of setting up postgres_changes replication
    async fn handle_system_notice(&self, payload: &serde_json::Value) {
        let status = payload.get("status").and_then(|v| v.as_str());
        let message = payload
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if status == Some(reply_status::ERROR) {
            let mut state = self.state.write().await;
            state.status = ChannelStatus::Errored;
            tracing::warn!("System error on channel {}: {}", self.topic, message);
            state.emit(ChannelLifecycle::Errored(message.to_string()));
        } else {
            tracing::debug!("System notice on channel {}: {}", self.topic, message);
        }
    }

    /// Resolves a pending push by ref. Returns `false` if the ref is unknown.
    pub(crate) async fn resolve_reply(
        &self,
        ref_id: &str,
        status: &str,
        response: serde_json::Value,
    ) -> bool {
        let mut state = self.state.write().await;
        let Some(push) = state.pending_pushes.remove(ref_id) else {
            return false;
        };

        // Applied here so the outcome is ordered with the events that follow it
        if state.join_ref.as_deref() == Some(ref_id) && state.status == ChannelStatus::Joining {
            self.apply_join_reply(&mut state, status, &response);
        }
        drop(state);

        push.resolve(status, response);
        true
    }

    /// Called by the client when the socket goes away
    pub(crate) async fn handle_socket_closed(&self) {
        let mut state = self.state.write().await;
        if !matches!(state.status, ChannelStatus::Joined | ChannelStatus::Joining) {
            return;
        }

        state.status = ChannelStatus::Errored;
        state.pending_pushes.clear();
        state.emit(ChannelLifecycle::Errored("socket closed".to_string()));
    }
}
