use super::config::SyncOptions;
use super::feed::{ChangeFeed, SubscriptionHandle, UserId};
use super::invalidator::{CacheInvalidator, NotificationLedger, run_invalidator};
use super::notify::{Notifier, connection_text};
use super::status::{ConnectionState, StatusBoard, run_status_consumer};
use super::transport::ChangeTransport;
use super::QueryCache;
use crate::infrastructure::TaskManager;
use crate::types::constants::NOTIFICATION_LEDGER_CAPACITY;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// Everything opened for one identity
struct SyncScope {
    user_id: UserId,
    subscriptions: Vec<SubscriptionHandle>,
    consumers: TaskManager,
}

/// Keeps the query cache consistent with the signed-in user's change feed.
///
/// Owns one subscription per watched table while an identity is set. Changing
/// the identity tears the previous scope down completely before the next one
/// opens; dropping the session releases everything.
///
/// ```no_run
/// use ledger_realtime::{QueryCache, RealtimeClient, RealtimeClientOptions};
/// use ledger_realtime::sync::{LogNotifier, RealtimeSync, SyncOptions, UserId};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RealtimeClient::new(
///     "wss://your-project.supabase.co/realtime/v1",
///     RealtimeClientOptions {
///         api_key: "your-anon-key".to_string(),
///         ..Default::default()
///     },
/// )?;
///
/// let mut sync = RealtimeSync::new(
///     Arc::new(client),
///     QueryCache::new(),
///     Arc::new(LogNotifier),
///     SyncOptions::from_env()?,
/// );
/// sync.set_identity(Some(UserId::new("8d0fd2b3-9ca7-4d9e-a95f-9e13dded2e63"))).await;
/// # Ok(())
/// # }
/// ```
pub struct RealtimeSync<T> {
    feed: ChangeFeed<T>,
    cache: QueryCache,
    notifier: Arc<dyn Notifier>,
    options: Arc<SyncOptions>,
    status_tx: Arc<watch::Sender<ConnectionState>>,
    scope: Option<SyncScope>,
    ledger: Arc<Mutex<NotificationLedger>>,
    ledger_owner: Option<UserId>,
}

impl<T: ChangeTransport> RealtimeSync<T> {
    pub fn new(
        transport: Arc<T>,
        cache: QueryCache,
        notifier: Arc<dyn Notifier>,
        options: SyncOptions,
    ) -> Self {
        let feed = ChangeFeed::new(transport)
            .with_schema(options.schema.clone())
            .with_buffer(options.feed_buffer);
        let (status_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            feed,
            cache,
            notifier,
            options: Arc::new(options),
            status_tx: Arc::new(status_tx),
            scope: None,
            ledger: Arc::new(Mutex::new(NotificationLedger::new(
                NOTIFICATION_LEDGER_CAPACITY,
            ))),
            ledger_owner: None,
        }
    }

    /// Watch for the aggregate connection state
    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.status_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.status_tx.borrow()
    }

    /// Status indicator text in the configured locale
    pub fn status_text(&self) -> &'static str {
        connection_text(self.connection_state(), self.options.locale)
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.scope.as_ref().map(|scope| &scope.user_id)
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Topics of the live subscriptions
    pub fn topics(&self) -> Vec<String> {
        self.scope
            .iter()
            .flat_map(|scope| scope.subscriptions.iter())
            .map(|handle| handle.topic().to_string())
            .collect()
    }

    /// Follows the authenticated identity.
    ///
    /// `None` (signed out) leaves no subscriptions and a `Disconnected` state.
    /// Setting the current identity again does nothing.
    pub async fn set_identity(&mut self, user_id: Option<UserId>) {
        if self.user_id() == user_id.as_ref() {
            return;
        }

        self.teardown().await;

        let Some(user_id) = user_id else {
            tracing::info!("No identity, live updates off");
            return;
        };

        if self.ledger_owner.as_ref() != Some(&user_id) {
            self.ledger.lock().await.clear();
            self.ledger_owner = Some(user_id.clone());
        }
        self.open_scope(user_id).await;
    }

    /// Replaces every subscription with a fresh one for the same identity.
    ///
    /// Changes already notified are not notified again.
    pub async fn reconnect(&mut self) {
        let Some(user_id) = self.user_id().cloned() else {
            tracing::debug!("Reconnect without identity ignored");
            return;
        };
        tracing::info!("Reconnecting live updates for {}", user_id);
        self.teardown().await;
        self.open_scope(user_id).await;
    }

    /// Releases all subscriptions and waits for them to close
    pub async fn shutdown(&mut self) {
        self.set_identity(None).await;
    }

    async fn open_scope(&mut self, user_id: UserId) {
        let board = Arc::new(Mutex::new(StatusBoard::new(Arc::clone(&self.status_tx))));
        let invalidator = Arc::new(CacheInvalidator::new(
            self.cache.clone(),
            Arc::clone(&self.options),
            Arc::clone(&self.notifier),
            Arc::clone(&self.ledger),
        ));

        let mut consumers = TaskManager::new();
        let mut subscriptions = Vec::with_capacity(self.options.tables.len());

        for table in &self.options.tables {
            let mut handle = self.feed.subscribe(&user_id, &table.name);
            board.lock().await.track(handle.topic());

            consumers.spawn(run_status_consumer(
                handle.listen(),
                handle.topic().to_string(),
                Arc::clone(&board),
            ));
            consumers.spawn(run_invalidator(
                handle.listen(),
                Arc::clone(&invalidator),
                table.name.clone(),
            ));

            handle.start();
            subscriptions.push(handle);
        }

        let state = board.lock().await.current();
        self.status_tx.send_replace(state);
        tracing::info!(
            "Live updates for {} opening on {} tables",
            user_id,
            subscriptions.len()
        );

        self.scope = Some(SyncScope {
            user_id,
            subscriptions,
            consumers,
        });
    }

    async fn teardown(&mut self) {
        let Some(scope) = self.scope.take() else {
            self.status_tx.send_replace(ConnectionState::Disconnected);
            return;
        };
        tracing::info!("Closing live updates for {}", scope.user_id);

        // Consumers first: nothing from this scope reaches the cache afterwards
        scope.consumers.shutdown().await;
        futures::future::join_all(
            scope
                .subscriptions
                .into_iter()
                .map(SubscriptionHandle::close),
        )
        .await;

        self.status_tx.send_replace(ConnectionState::Disconnected);
    }
}

impl<T> Drop for RealtimeSync<T> {
    fn drop(&mut self) {
        if self.scope.take().is_some() {
            self.status_tx.send_replace(ConnectionState::Disconnected);
        }
    }
}
