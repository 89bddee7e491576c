use crate::messaging::ChannelEvent;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;

/// Reply to a push, as carried by `phx_reply`
#[derive(Debug, Clone, PartialEq)]
pub struct PushReply {
    pub status: String,
    pub response: Value,
}

/// A message sent to the server that is still waiting for its `phx_reply`.
pub struct Push {
    pub event: ChannelEvent,
    pub ref_id: String,
    pub timeout: Duration,
    reply_tx: oneshot::Sender<PushReply>,
}

impl Push {
    pub fn new(
        event: ChannelEvent,
        ref_id: String,
        timeout: Duration,
    ) -> (Self, oneshot::Receiver<PushReply>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        (
            Self {
                event,
                ref_id,
                timeout,
                reply_tx,
            },
            reply_rx,
        )
    }

    /// Hands the reply to whoever is awaiting this push
    pub fn resolve(self, status: impl Into<String>, response: Value) {
        let reply = PushReply {
            status: status.into(),
            response,
        };
        if self.reply_tx.send(reply).is_err() {
            tracing::debug!(
                "Reply for push '{}' ({}) arrived after its waiter went away",
                self.event,
                self.ref_id
            );
        }
    }
}

impl std::fmt::Debug for Push {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Push")
            .field("event", &self.event)
            .field("ref_id", &self.ref_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}
