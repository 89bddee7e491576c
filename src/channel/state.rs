use super::PostgresChangesFilter;
use super::push::Push;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Channel status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Closed,
    Errored,
    Joined,
    Joining,
    Leaving,
}

/// Lifecycle notifications a channel reports to its listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelLifecycle {
    /// The server acknowledged the join
    Subscribed,
    /// The channel was left or closed by the server
    Closed,
    /// The server rejected the join, errored the channel, or the socket dropped
    Errored(String),
    /// No join reply arrived in time
    TimedOut,
}

/// One item on a channel's ordered update feed
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    Change(serde_json::Value),
    Lifecycle(ChannelLifecycle),
}

/// Postgres changes listener
#[derive(Debug)]
pub struct EventBinding {
    pub filter: PostgresChangesFilter,
    pub sender: mpsc::Sender<serde_json::Value>,
}

/// Listener receiving matching changes and lifecycle on a single queue
#[derive(Debug)]
pub struct FeedBinding {
    pub filter: PostgresChangesFilter,
    pub sender: mpsc::UnboundedSender<ChannelUpdate>,
}

/// Mutable state for a RealtimeChannel
pub struct ChannelState {
    pub status: ChannelStatus,
    pub bindings: Vec<EventBinding>,
    pub pending_pushes: HashMap<String, Push>,
    pub join_ref: Option<String>,
    /// Set by `subscribe`, cleared by `unsubscribe`; drives rejoin after reconnect
    pub wants_join: bool,
    pub lifecycle_listeners: Vec<mpsc::UnboundedSender<ChannelLifecycle>>,
    pub feeds: Vec<FeedBinding>,
}

impl ChannelState {
    pub fn new() -> Self {
        Self {
            status: ChannelStatus::Closed,
            bindings: Vec::new(),
            pending_pushes: HashMap::new(),
            join_ref: None,
            wants_join: false,
            lifecycle_listeners: Vec::new(),
            feeds: Vec::new(),
        }
    }

    /// Fans a lifecycle notification out, pruning listeners that went away
    pub fn emit(&mut self, lifecycle: ChannelLifecycle) {
        self.lifecycle_listeners
            .retain(|listener| listener.send(lifecycle.clone()).is_ok());
        self.feeds.retain(|feed| {
            feed.sender
                .send(ChannelUpdate::Lifecycle(lifecycle.clone()))
                .is_ok()
        });
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new()
    }
}
