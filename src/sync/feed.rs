use super::transport::{ChangeTransport, FeedRequest, TransportEvent};
use super::{ChangeEvent, FeedMessage, FeedStatus};
use crate::channel::ChannelLifecycle;
use crate::types::FeedError;
use crate::types::constants::{DEFAULT_SCHEMA, FEED_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// Authenticated identity whose rows are streamed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One live change stream for a (user, table) pair.
///
/// Nothing is opened until [`start`](Self::start) is called, so consumers can
/// attach with [`listen`](Self::listen) without missing the first messages.
/// Dropping the handle stops forwarding and leaves the channel in the
/// background; [`ChangeFeed::unsubscribe`] does the same and waits for it.
pub struct SubscriptionHandle {
    id: uuid::Uuid,
    user_id: UserId,
    table: String,
    topic: String,
    events: broadcast::Sender<FeedMessage>,
    start_tx: Option<oneshot::Sender<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    pump: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// A new receiver; sees every message published after this call
    pub fn listen(&self) -> broadcast::Receiver<FeedMessage> {
        self.events.subscribe()
    }

    /// Opens the remote channel. Calling it again does nothing.
    pub fn start(&mut self) {
        if let Some(start_tx) = self.start_tx.take() {
            tracing::debug!("Starting change feed {}", self.topic);
            // The pump only goes away after shutdown
            let _ = start_tx.send(());
        }
    }

    pub fn is_started(&self) -> bool {
        self.start_tx.is_none()
    }

    /// Stops forwarding and waits until the channel has been released
    pub async fn close(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(pump) = self.pump.take()
            && let Err(e) = pump.await
        {
            tracing::warn!("Change feed {} ended abnormally: {}", self.topic, e);
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("table", &self.table)
            .field("topic", &self.topic)
            .field("started", &self.is_started())
            .finish()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// Opens per-user change streams over a [`ChangeTransport`]
pub struct ChangeFeed<T> {
    transport: Arc<T>,
    schema: String,
    buffer: usize,
}

impl<T> Clone for ChangeFeed<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            schema: self.schema.clone(),
            buffer: self.buffer,
        }
    }
}

impl<T: ChangeTransport> ChangeFeed<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            schema: DEFAULT_SCHEMA.to_string(),
            buffer: FEED_BUFFER_SIZE,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Prepares a stream of every change to `user_id`'s rows in `table`.
    ///
    /// Never fails: a channel the transport cannot open shows up on the stream
    /// as `Status(Failed(TransportUnavailable))`.
    pub fn subscribe(&self, user_id: &UserId, table: &str) -> SubscriptionHandle {
        let request = FeedRequest::for_owner(&self.schema, table, user_id);
        let (events, _) = broadcast::channel(self.buffer);
        let (start_tx, start_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let id = request.id;
        let topic = request.topic.clone();
        let pump = tokio::spawn(run_pump(
            Arc::clone(&self.transport),
            request,
            events.clone(),
            start_rx,
            shutdown_rx,
        ));

        SubscriptionHandle {
            id,
            user_id: user_id.clone(),
            table: table.to_string(),
            topic,
            events,
            start_tx: Some(start_tx),
            shutdown_tx: Some(shutdown_tx),
            pump: Some(pump),
        }
    }

    /// Tears a subscription down and waits for the transport to release it
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        tracing::debug!("Unsubscribing {}", handle.topic());
        handle.close().await;
    }
}

fn publish(events: &broadcast::Sender<FeedMessage>, message: FeedMessage) {
    // No receivers is fine
    let _ = events.send(message);
}

/// Maps a transport lifecycle report onto the feed taxonomy
fn feed_status(lifecycle: ChannelLifecycle, joined: &mut bool) -> FeedStatus {
    let reason = match lifecycle {
        ChannelLifecycle::Subscribed => {
            *joined = true;
            return FeedStatus::Subscribed;
        }
        ChannelLifecycle::Closed => "channel closed".to_string(),
        ChannelLifecycle::Errored(reason) => reason,
        ChannelLifecycle::TimedOut => "join timed out".to_string(),
    };

    let error = if *joined {
        FeedError::ChannelClosed(reason)
    } else {
        FeedError::TransportUnavailable(reason)
    };
    *joined = false;
    FeedStatus::Failed(error)
}

async fn run_pump<T: ChangeTransport>(
    transport: Arc<T>,
    request: FeedRequest,
    events: broadcast::Sender<FeedMessage>,
    start_rx: oneshot::Receiver<()>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    tokio::select! {
        biased;
        _ = &mut shutdown_rx => return,
        started = start_rx => {
            if started.is_err() {
                return;
            }
        }
    }

    let topic = request.topic.clone();
    let opened = tokio::select! {
        biased;
        _ = &mut shutdown_rx => None,
        opened = transport.open(request.clone()) => Some(opened),
    };

    let mut subscription = match opened {
        Some(Ok(subscription)) => subscription,
        Some(Err(e)) => {
            tracing::warn!("Could not open change feed {}: {}", topic, e);
            publish(
                &events,
                FeedMessage::Status(FeedStatus::Failed(FeedError::TransportUnavailable(
                    e.to_string(),
                ))),
            );
            return;
        }
        None => {
            close_transport(transport.as_ref(), &request).await;
            return;
        }
    };

    tracing::info!("Change feed {} opened as {}", topic, subscription.topic);
    let mut joined = false;

    loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            event = subscription.events.recv() => event,
        };

        match event {
            Some(TransportEvent::Change(payload)) => match ChangeEvent::from_payload(&payload) {
                Ok(change) => publish(&events, FeedMessage::Change(change)),
                Err(e) => tracing::warn!("Dropping event on {}: {}", topic, e),
            },
            Some(TransportEvent::Status(lifecycle)) => {
                tracing::debug!("Change feed {} reported {:?}", topic, lifecycle);
                publish(
                    &events,
                    FeedMessage::Status(feed_status(lifecycle, &mut joined)),
                );
            }
            None => {
                let status = feed_status(
                    ChannelLifecycle::Errored("transport stream ended".to_string()),
                    &mut joined,
                );
                publish(&events, FeedMessage::Status(status));
                break;
            }
        }
    }

    close_transport(transport.as_ref(), &request).await;
}

async fn close_transport<T: ChangeTransport>(transport: &T, request: &FeedRequest) {
    match transport.close(request).await {
        Ok(()) => tracing::debug!("Change feed {} closed", request.topic),
        Err(e) => tracing::warn!("Closing change feed {} failed: {}", request.topic, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{FakeTransport, TransportOp, delete_payload, insert_payload};
    use crate::sync::{RowChange, RowId};
    use serde_json::json;

    async fn next(rx: &mut broadcast::Receiver<FeedMessage>) -> FeedMessage {
        tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("no message in time")
            .expect("feed closed")
    }

    #[test]
    fn test_failure_taxonomy_follows_join_state() {
        let mut joined = false;
        assert_eq!(
            feed_status(ChannelLifecycle::Errored("denied".to_string()), &mut joined),
            FeedStatus::Failed(FeedError::TransportUnavailable("denied".to_string()))
        );
        assert_eq!(
            feed_status(ChannelLifecycle::Subscribed, &mut joined),
            FeedStatus::Subscribed
        );
        assert!(matches!(
            feed_status(ChannelLifecycle::Closed, &mut joined),
            FeedStatus::Failed(FeedError::ChannelClosed(_))
        ));
        assert!(matches!(
            feed_status(ChannelLifecycle::TimedOut, &mut joined),
            FeedStatus::Failed(FeedError::TransportUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_nothing_opens_before_start() {
        let transport = Arc::new(FakeTransport::new());
        let feed = ChangeFeed::new(Arc::clone(&transport));

        let handle = feed.subscribe(&UserId::new("u1"), "expenses");
        tokio::task::yield_now().await;
        assert!(transport.ops().is_empty());
        assert!(!handle.is_started());

        feed.unsubscribe(handle).await;
        assert!(transport.ops().is_empty());
    }

    #[tokio::test]
    async fn test_forwards_changes_in_order() {
        let transport = Arc::new(FakeTransport::new());
        let feed = ChangeFeed::new(Arc::clone(&transport));
        let mut handle = feed.subscribe(&UserId::new("u1"), "expenses");
        let mut rx = handle.listen();
        handle.start();

        let sender = transport.wait_open("expenses-changes-u1").await;
        sender
            .send(TransportEvent::Status(ChannelLifecycle::Subscribed))
            .await
            .unwrap();
        sender
            .send(TransportEvent::Change(insert_payload(
                "expenses",
                json!({"id": 1, "user_id": "u1"}),
                "t1",
            )))
            .await
            .unwrap();
        sender
            .send(TransportEvent::Change(delete_payload("expenses", 1, "t2")))
            .await
            .unwrap();

        assert_eq!(next(&mut rx).await, FeedMessage::Status(FeedStatus::Subscribed));
        let FeedMessage::Change(first) = next(&mut rx).await else {
            panic!("expected a change");
        };
        assert!(matches!(first.change, RowChange::Inserted(_)));
        let FeedMessage::Change(second) = next(&mut rx).await else {
            panic!("expected a change");
        };
        assert_eq!(second.change, RowChange::Deleted(RowId::new("1")));

        let request = transport.request("expenses-changes-u1").unwrap();
        assert_eq!(request.row_filter.as_deref(), Some("user_id=eq.u1"));

        feed.unsubscribe(handle).await;
        assert_eq!(
            transport.ops(),
            vec![
                TransportOp::Open("expenses-changes-u1".to_string()),
                TransportOp::Close("expenses-changes-u1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_events_are_dropped() {
        let transport = Arc::new(FakeTransport::new());
        let feed = ChangeFeed::new(Arc::clone(&transport));
        let mut handle = feed.subscribe(&UserId::new("u1"), "income");
        let mut rx = handle.listen();
        handle.start();

        let sender = transport.wait_open("income-changes-u1").await;
        sender
            .send(TransportEvent::Change(json!({"unexpected": true})))
            .await
            .unwrap();
        sender
            .send(TransportEvent::Change(delete_payload("income", 5, "t1")))
            .await
            .unwrap();

        let FeedMessage::Change(event) = next(&mut rx).await else {
            panic!("expected the well-formed change");
        };
        assert_eq!(event.table, "income");
    }

    #[tokio::test]
    async fn test_open_failure_surfaces_as_status() {
        let transport = Arc::new(FakeTransport::failing());
        let feed = ChangeFeed::new(Arc::clone(&transport));
        let mut handle = feed.subscribe(&UserId::new("u1"), "budgets");
        let mut rx = handle.listen();
        handle.start();

        assert!(matches!(
            next(&mut rx).await,
            FeedMessage::Status(FeedStatus::Failed(FeedError::TransportUnavailable(_)))
        ));
        feed.unsubscribe(handle).await;
    }

    #[tokio::test]
    async fn test_stream_end_after_join_is_channel_closed() {
        let transport = Arc::new(FakeTransport::new());
        let feed = ChangeFeed::new(Arc::clone(&transport));
        let mut handle = feed.subscribe(&UserId::new("u1"), "mileage");
        let mut rx = handle.listen();
        handle.start();

        let sender = transport.wait_open("mileage-changes-u1").await;
        sender
            .send(TransportEvent::Status(ChannelLifecycle::Subscribed))
            .await
            .unwrap();
        drop(sender);
        transport.drop_senders();

        assert_eq!(next(&mut rx).await, FeedMessage::Status(FeedStatus::Subscribed));
        assert!(matches!(
            next(&mut rx).await,
            FeedMessage::Status(FeedStatus::Failed(FeedError::ChannelClosed(_)))
        ));
    }

    #[tokio::test]
    async fn test_dropping_handle_releases_channel() {
        let transport = Arc::new(FakeTransport::new());
        let feed = ChangeFeed::new(Arc::clone(&transport));
        let mut handle = feed.subscribe(&UserId::new("u1"), "contracts");
        handle.start();
        transport.wait_open("contracts-changes-u1").await;

        drop(handle);
        transport
            .wait_op(TransportOp::Close("contracts-changes-u1".to_string()))
            .await;
    }
}
