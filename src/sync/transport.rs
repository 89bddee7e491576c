//! The seam between the sync layer and whatever delivers change events.

use crate::channel::{
    ChannelLifecycle, ChannelUpdate, PostgresChangeEvent, PostgresChangesFilter,
    RealtimeChannelOptions,
};
use crate::client::RealtimeClient;
use crate::types::Result;
use crate::types::constants::{BINDING_BUFFER_SIZE, OWNER_COLUMN, TOPIC_PREFIX};
use std::future::Future;
use tokio::sync::mpsc;

use super::UserId;

/// What to stream: one table, one event category, one row-ownership predicate.
///
/// `topic` names the stream; `id` tells apart two requests for the same
/// stream so each gets its own transport channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub id: uuid::Uuid,
    pub topic: String,
    pub schema: String,
    pub table: String,
    pub event: PostgresChangeEvent,
    pub row_filter: Option<String>,
}

impl FeedRequest {
    /// All changes to `table` rows owned by `user_id`
    pub fn for_owner(schema: &str, table: &str, user_id: &UserId) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            topic: format!("{}-changes-{}", table, user_id),
            schema: schema.to_string(),
            table: table.to_string(),
            event: PostgresChangeEvent::All,
            row_filter: Some(format!("{}=eq.{}", OWNER_COLUMN, user_id)),
        }
    }

    /// Channel topic owned by this request alone
    pub fn channel_topic(&self) -> String {
        format!("{}:{}", self.topic, self.id.simple())
    }

    pub fn filter(&self) -> PostgresChangesFilter {
        let filter = PostgresChangesFilter::new(self.event, self.schema.clone()).table(&self.table);
        match &self.row_filter {
            Some(row_filter) => filter.filter(row_filter),
            None => filter,
        }
    }
}

/// One item on a transport stream, in the order the transport produced it
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Change(serde_json::Value),
    Status(ChannelLifecycle),
}

impl From<ChannelUpdate> for TransportEvent {
    fn from(update: ChannelUpdate) -> Self {
        match update {
            ChannelUpdate::Change(payload) => TransportEvent::Change(payload),
            ChannelUpdate::Lifecycle(lifecycle) => TransportEvent::Status(lifecycle),
        }
    }
}

/// An opened transport channel
#[derive(Debug)]
pub struct TransportSubscription {
    /// The transport's own name for the channel
    pub topic: String,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// A remote change-feed transport.
///
/// `open` returns once the channel request is on its way; whether the server
/// accepted it arrives later as a [`TransportEvent::Status`]. Every `open`
/// gets a channel of its own; `close` releases the one opened for that same
/// request and must tolerate requests that never finished opening.
pub trait ChangeTransport: Send + Sync + 'static {
    fn open(&self, request: FeedRequest)
    -> impl Future<Output = Result<TransportSubscription>> + Send;

    fn close(&self, request: &FeedRequest) -> impl Future<Output = Result<()>> + Send;
}

impl ChangeTransport for RealtimeClient {
    async fn open(&self, request: FeedRequest) -> Result<TransportSubscription> {
        self.connect().await?;
        self.wait_until_open().await?;

        let channel = self
            .exclusive_channel(&request.channel_topic(), RealtimeChannelOptions::default())
            .await?;
        let updates = channel.updates(request.filter()).await;

        if let Err(e) = channel.subscribe().await {
            if let Err(close_err) = self.remove_channel(channel.topic()).await {
                tracing::debug!("Cleanup after failed join errored: {}", close_err);
            }
            return Err(e);
        }

        let (tx, rx) = mpsc::channel(BINDING_BUFFER_SIZE);
        tokio::spawn(forward_channel_updates(updates, tx));

        Ok(TransportSubscription {
            topic: channel.topic().to_string(),
            events: rx,
        })
    }

    async fn close(&self, request: &FeedRequest) -> Result<()> {
        self.remove_channel(&format!("{}{}", TOPIC_PREFIX, request.channel_topic()))
            .await
    }
}

/// Relays a channel's ordered updates until either side goes away
async fn forward_channel_updates(
    mut updates: mpsc::UnboundedReceiver<ChannelUpdate>,
    tx: mpsc::Sender<TransportEvent>,
) {
    loop {
        let update = tokio::select! {
            biased;
            _ = tx.closed() => break,
            update = updates.recv() => update,
        };
        let Some(update) = update else {
            break;
        };
        if tx.send(update.into()).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RealtimeChannel;
    use crate::client::{RealtimeClientOptions, SocketState};
    use crate::messaging::{ChannelEvent, SystemEvent};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_feed_request_scopes_rows_to_owner() {
        let request = FeedRequest::for_owner("public", "expenses", &UserId::new("u-42"));

        assert_eq!(request.topic, "expenses-changes-u-42");
        assert_eq!(request.row_filter.as_deref(), Some("user_id=eq.u-42"));

        let config = request.filter().to_config();
        assert_eq!(config.event, "*");
        assert_eq!(config.schema, "public");
        assert_eq!(config.table.as_deref(), Some("expenses"));
        assert_eq!(config.filter.as_deref(), Some("user_id=eq.u-42"));
    }

    #[test]
    fn test_requests_for_one_stream_get_distinct_channels() {
        let user = UserId::new("u1");
        let a = FeedRequest::for_owner("public", "expenses", &user);
        let b = FeedRequest::for_owner("public", "expenses", &user);

        assert_eq!(a.topic, b.topic);
        assert_ne!(a.channel_topic(), b.channel_topic());
        assert!(a.channel_topic().starts_with("expenses-changes-u1:"));
    }

    async fn open_client() -> RealtimeClient {
        let client = RealtimeClient::new(
            "ws://localhost:4000/realtime/v1",
            RealtimeClientOptions {
                api_key: "anon".to_string(),
                auto_reconnect: false,
                ..Default::default()
            },
        )
        .unwrap();
        client.connection.set_state(SocketState::Open).await;
        client
    }

    async fn channel_for(client: &RealtimeClient, topic: &str) -> Arc<RealtimeChannel> {
        client
            .channels()
            .await
            .into_iter()
            .find(|channel| channel.topic() == topic)
            .unwrap()
    }

    async fn acknowledge_join(channel: &RealtimeChannel) {
        let join_ref = channel.state.read().await.join_ref.clone().unwrap();
        assert!(channel.resolve_reply(&join_ref, "ok", json!({})).await);
    }

    fn expense_insert() -> serde_json::Value {
        json!({
            "ids": [1],
            "data": {
                "commit_timestamp": "2025-11-27T16:16:54.545Z",
                "record": {"id": 1, "user_id": "u1", "amount": 42.5},
                "schema": "public",
                "table": "expenses",
                "type": "INSERT"
            }
        })
    }

    async fn next(events: &mut mpsc::Receiver<TransportEvent>) -> Option<TransportEvent> {
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("no transport event in time")
    }

    #[tokio::test]
    async fn test_same_stream_opened_twice_is_not_shared() {
        let client = open_client().await;
        let user = UserId::new("u1");
        let request_a = FeedRequest::for_owner("public", "expenses", &user);
        let request_b = FeedRequest::for_owner("public", "expenses", &user);

        let a = client.open(request_a.clone()).await.unwrap();
        let mut b = client.open(request_b.clone()).await.unwrap();

        assert_ne!(a.topic, b.topic);
        assert_eq!(client.channels().await.len(), 2);

        let channel_b = channel_for(&client, &b.topic).await;
        acknowledge_join(&channel_b).await;
        assert_eq!(
            next(&mut b.events).await,
            Some(TransportEvent::Status(ChannelLifecycle::Subscribed))
        );

        client.close(&request_a).await.unwrap();

        let remaining = client.channels().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].topic(), b.topic);

        channel_b
            .trigger(ChannelEvent::PostgresChanges, expense_insert())
            .await;
        assert!(matches!(
            next(&mut b.events).await,
            Some(TransportEvent::Change(_))
        ));

        client.close(&request_b).await.unwrap();
        assert!(client.channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_change_before_close_is_delivered_first() {
        let client = open_client().await;
        let user = UserId::new("u1");

        for _ in 0..25 {
            let request = FeedRequest::for_owner("public", "expenses", &user);
            let mut subscription = client.open(request.clone()).await.unwrap();
            let channel = channel_for(&client, &subscription.topic).await;
            acknowledge_join(&channel).await;

            channel
                .trigger(ChannelEvent::PostgresChanges, expense_insert())
                .await;
            channel
                .trigger(SystemEvent::Close.into(), json!({}))
                .await;

            assert_eq!(
                next(&mut subscription.events).await,
                Some(TransportEvent::Status(ChannelLifecycle::Subscribed))
            );
            assert!(matches!(
                next(&mut subscription.events).await,
                Some(TransportEvent::Change(_))
            ));
            assert_eq!(
                next(&mut subscription.events).await,
                Some(TransportEvent::Status(ChannelLifecycle::Closed))
            );

            client.close(&request).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_forwarding_stops_when_consumer_leaves() {
        let (_update_tx, updates) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::channel(4);
        let forward = tokio::spawn(forward_channel_updates(updates, tx));

        drop(rx);
        forward.await.unwrap();
    }
}
