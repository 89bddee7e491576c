use super::{FeedMessage, FeedStatus};
use crate::types::FeedError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};

/// Connection status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Status state machine for one subscription.
///
/// Starts in `Connecting`. Only transitions reported by the transport move it;
/// a `Disconnected` tracker goes back to `Connected` only when the transport
/// itself reports a fresh join.
#[derive(Debug)]
pub struct ConnectionStatusTracker {
    state: ConnectionState,
    last_error: Option<FeedError>,
}

impl ConnectionStatusTracker {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            last_error: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&FeedError> {
        self.last_error.as_ref()
    }

    pub fn apply(&mut self, status: &FeedStatus) -> ConnectionState {
        self.state = match status {
            FeedStatus::Subscribed => {
                self.last_error = None;
                ConnectionState::Connected
            }
            FeedStatus::Failed(error) => {
                self.last_error = Some(error.clone());
                ConnectionState::Disconnected
            }
        };
        self.state
    }
}

impl Default for ConnectionStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds per-subscription states into the one state the user sees.
///
/// Any disconnected subscription makes the whole feed disconnected; all must be
/// connected for it to be connected. No subscriptions at all is disconnected.
pub fn aggregate<I>(states: I) -> ConnectionState
where
    I: IntoIterator<Item = ConnectionState>,
{
    let mut seen_any = false;
    let mut all_connected = true;

    for state in states {
        seen_any = true;
        match state {
            ConnectionState::Disconnected => return ConnectionState::Disconnected,
            ConnectionState::Connecting => all_connected = false,
            ConnectionState::Connected => {}
        }
    }

    match (seen_any, all_connected) {
        (false, _) => ConnectionState::Disconnected,
        (true, true) => ConnectionState::Connected,
        (true, false) => ConnectionState::Connecting,
    }
}

/// Trackers for every subscription of one session scope
pub struct StatusBoard {
    trackers: HashMap<String, ConnectionStatusTracker>,
    published: Arc<watch::Sender<ConnectionState>>,
}

impl StatusBoard {
    pub fn new(published: Arc<watch::Sender<ConnectionState>>) -> Self {
        Self {
            trackers: HashMap::new(),
            published,
        }
    }

    /// Starts tracking a fresh subscription in `Connecting`
    pub fn track(&mut self, topic: &str) {
        self.trackers
            .insert(topic.to_string(), ConnectionStatusTracker::new());
        self.publish();
    }

    pub fn apply(&mut self, topic: &str, status: &FeedStatus) -> ConnectionState {
        let Some(tracker) = self.trackers.get_mut(topic) else {
            tracing::debug!("Status for untracked subscription {} ignored", topic);
            return self.current();
        };

        let state = tracker.apply(status);
        match status {
            FeedStatus::Subscribed => tracing::info!("Live updates connected: {}", topic),
            FeedStatus::Failed(error) => {
                tracing::warn!("Live updates disconnected: {} ({})", topic, error)
            }
        }
        tracing::debug!("Subscription {} is now {:?}", topic, state);

        self.publish();
        self.current()
    }

    pub fn current(&self) -> ConnectionState {
        aggregate(self.trackers.values().map(ConnectionStatusTracker::state))
    }

    fn publish(&self) {
        self.published.send_replace(self.current());
    }
}

/// Consumer task: feeds a subscription's status messages into the board
pub async fn run_status_consumer(
    mut rx: broadcast::Receiver<FeedMessage>,
    topic: String,
    board: Arc<Mutex<StatusBoard>>,
) {
    loop {
        match rx.recv().await {
            Ok(FeedMessage::Status(status)) => {
                board.lock().await.apply(&topic, &status);
            }
            Ok(FeedMessage::Change(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Status consumer for {} skipped {} messages", topic, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
