use super::config::SyncOptions;
use super::notify::{Notifier, insert_toast};
use super::{ChangeEvent, FeedMessage, QueryCache, RowChange};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// Bounded memory of changes already shown to the user.
///
/// Oldest fingerprints are forgotten first once `capacity` is reached.
#[derive(Debug)]
pub struct NotificationLedger {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl NotificationLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Records `fingerprint`; false if it was already recorded
    pub fn record(&mut self, fingerprint: &str) -> bool {
        if self.seen.contains(fingerprint) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.order.push_back(fingerprint.to_string());
        self.seen.insert(fingerprint.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

/// Turns change events into stale cache entries and insert toasts
pub struct CacheInvalidator {
    cache: QueryCache,
    options: Arc<SyncOptions>,
    notifier: Arc<dyn Notifier>,
    ledger: Arc<Mutex<NotificationLedger>>,
}

impl CacheInvalidator {
    pub fn new(
        cache: QueryCache,
        options: Arc<SyncOptions>,
        notifier: Arc<dyn Notifier>,
        ledger: Arc<Mutex<NotificationLedger>>,
    ) -> Self {
        Self {
            cache,
            options,
            notifier,
            ledger,
        }
    }

    /// Applies one change and returns how many cache entries went stale
    pub async fn handle(&self, event: &ChangeEvent) -> usize {
        let Some(table) = self.options.table(&event.table) else {
            tracing::debug!("Change for unwatched table {} ignored", event.table);
            return 0;
        };

        let mut staled = 0;
        for prefix in &table.key_prefixes {
            staled += self.cache.invalidate(prefix).await;
        }

        if self.options.notify_inserts
            && matches!(event.change, RowChange::Inserted(_))
            && let Some(toast) = insert_toast(event, table, self.options.locale)
        {
            let fresh = self.ledger.lock().await.record(&event.fingerprint());
            if fresh {
                self.notifier.notify(&toast.message, toast.detail.as_deref());
            } else {
                tracing::debug!("Already notified {}", event.fingerprint());
            }
        }

        staled
    }

    /// Stales everything `table` feeds; used when events may have been missed
    pub async fn invalidate_table(&self, table: &str) -> usize {
        let Some(table) = self.options.table(table) else {
            return 0;
        };
        let mut staled = 0;
        for prefix in &table.key_prefixes {
            staled += self.cache.invalidate(prefix).await;
        }
        staled
    }
}

/// Consumer task: applies a subscription's changes to the cache
pub async fn run_invalidator(
    mut rx: broadcast::Receiver<FeedMessage>,
    invalidator: Arc<CacheInvalidator>,
    table: String,
) {
    loop {
        match rx.recv().await {
            Ok(FeedMessage::Change(event)) => {
                invalidator.handle(&event).await;
            }
            Ok(FeedMessage::Status(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    "Invalidator for {} missed {} messages, staling all of its queries",
                    table,
                    skipped
                );
                invalidator.invalidate_table(&table).await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
