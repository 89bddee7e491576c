use crate::types::Result;
use crate::types::constants::INVALIDATION_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Semantic identity of a cached query, e.g. `["expenses", "<user id>"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// A cached value and whether the next read must re-fetch it
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub value: Value,
    pub stale: bool,
}

/// Reads authoritative data for a query key
pub trait QueryFetcher: Send + Sync {
    fn fetch(&self, key: &QueryKey) -> impl Future<Output = Result<Value>> + Send;
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<QueryKey, CachedValue>,
    /// Bumped by every invalidation; lets a fetch notice it raced one
    epoch: u64,
}

/// Shared query cache.
///
/// The sync layer only ever marks entries stale; values are written by readers
/// through [`insert`](Self::insert) or [`get_or_fetch`](Self::get_or_fetch).
/// Cloning is cheap and clones share entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<RwLock<CacheInner>>,
    invalidations: broadcast::Sender<QueryKey>,
}

impl QueryCache {
    pub fn new() -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_BUFFER_SIZE);
        Self {
            inner: Arc::new(RwLock::new(CacheInner::default())),
            invalidations,
        }
    }

    /// Stores a fresh value
    pub async fn insert(&self, key: QueryKey, value: Value) {
        self.inner
            .write()
            .await
            .entries
            .insert(key, CachedValue { value, stale: false });
    }

    pub async fn get(&self, key: &QueryKey) -> Option<CachedValue> {
        self.inner.read().await.entries.get(key).cloned()
    }

    pub async fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.inner.read().await.entries.get(key).map(|entry| entry.stale)
    }

    pub async fn keys(&self) -> Vec<QueryKey> {
        self.inner.read().await.entries.keys().cloned().collect()
    }

    /// Marks every entry under `prefix` stale and returns how many matched.
    ///
    /// Idempotent: invalidating an already stale entry changes nothing but is
    /// still announced on [`invalidations()`](Self::invalidations).
    pub async fn invalidate(&self, prefix: &QueryKey) -> usize {
        let staled: Vec<QueryKey> = {
            let mut inner = self.inner.write().await;
            inner.epoch += 1;
            inner
                .entries
                .iter_mut()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, entry)| {
                    entry.stale = true;
                    key.clone()
                })
                .collect()
        };

        tracing::debug!("Invalidated {} entries under {}", staled.len(), prefix);
        for key in &staled {
            // No subscribers is fine
            let _ = self.invalidations.send(key.clone());
        }
        staled.len()
    }

    /// Stream of keys as they are marked stale, for readers that refetch eagerly
    pub fn invalidations(&self) -> broadcast::Receiver<QueryKey> {
        self.invalidations.subscribe()
    }

    /// Drops every entry, e.g. on logout
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.epoch += 1;
    }

    /// Returns the cached value, fetching it when missing or stale.
    ///
    /// A value whose fetch overlapped an invalidation is returned but stored as
    /// stale, so the following read fetches again.
    ///
    /// # Errors
    ///
    /// Propagates the fetcher's error; the entry is left as it was.
    pub async fn get_or_fetch<F>(&self, key: &QueryKey, fetcher: &F) -> Result<Value>
    where
        F: QueryFetcher,
    {
        let epoch = {
            let inner = self.inner.read().await;
            if let Some(entry) = inner.entries.get(key)
                && !entry.stale
            {
                return Ok(entry.value.clone());
            }
            inner.epoch
        };

        let value = fetcher.fetch(key).await?;

        let mut inner = self.inner.write().await;
        let stale = inner.epoch != epoch;
        inner.entries.insert(
            key.clone(),
            CachedValue {
                value: value.clone(),
                stale,
            },
        );
        Ok(value)
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RealtimeError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl QueryFetcher for CountingFetcher {
        async fn fetch(&self, key: &QueryKey) -> Result<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({"key": key.to_string(), "fetch": n}))
        }
    }

    struct FailingFetcher;

    impl QueryFetcher for FailingFetcher {
        async fn fetch(&self, _key: &QueryKey) -> Result<Value> {
            Err(RealtimeError::Connection("offline".to_string()))
        }
    }

    #[test]
    fn test_prefix_matching() {
        let key = QueryKey::new(["expenses", "u1", "2025-11"]);
        assert!(key.starts_with(&QueryKey::new(["expenses"])));
        assert!(key.starts_with(&QueryKey::new(["expenses", "u1"])));
        assert!(!key.starts_with(&QueryKey::new(["expenses", "u2"])));
        assert!(!key.starts_with(&QueryKey::new(["expense"])));
        assert_eq!(key.to_string(), "[expenses, u1, 2025-11]");
    }

    #[tokio::test]
    async fn test_invalidate_marks_only_matching_keys() {
        let cache = QueryCache::new();
        let expenses = QueryKey::new(["expenses", "u1"]);
        let income = QueryKey::new(["income", "u1"]);
        cache.insert(expenses.clone(), json!([])).await;
        cache.insert(income.clone(), json!([])).await;

        assert_eq!(cache.invalidate(&QueryKey::new(["expenses"])).await, 1);

        assert_eq!(cache.is_stale(&expenses).await, Some(true));
        assert_eq!(cache.is_stale(&income).await, Some(false));
        assert_eq!(cache.is_stale(&QueryKey::new(["budgets"])).await, None);
    }

    #[tokio::test]
    async fn test_invalidation_is_idempotent_and_announced() {
        let cache = QueryCache::new();
        let key = QueryKey::new(["mileage", "u1"]);
        cache.insert(key.clone(), json!([])).await;
        let mut announced = cache.invalidations();

        cache.invalidate(&QueryKey::new(["mileage"])).await;
        cache.invalidate(&QueryKey::new(["mileage"])).await;

        assert_eq!(cache.is_stale(&key).await, Some(true));
        assert_eq!(announced.recv().await.unwrap(), key);
        assert_eq!(announced.recv().await.unwrap(), key);
    }

    #[tokio::test]
    async fn test_full_buffer_of_invalidations_is_announced_without_lag() {
        let cache = QueryCache::new();
        for month in 0..INVALIDATION_BUFFER_SIZE {
            let key = QueryKey::new(["income".to_string(), "u1".to_string(), month.to_string()]);
            cache.insert(key, json!([])).await;
        }
        let mut announced = cache.invalidations();

        cache.invalidate(&QueryKey::new(["income"])).await;

        for _ in 0..INVALIDATION_BUFFER_SIZE {
            let key = announced.recv().await.unwrap();
            assert!(key.starts_with(&QueryKey::new(["income"])));
        }
        assert!(announced.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_get_or_fetch_refetches_only_when_stale() {
        let cache = QueryCache::new();
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
        };
        let key = QueryKey::new(["contracts", "u1"]);

        let first = cache.get_or_fetch(&key, &fetcher).await.unwrap();
        let second = cache.get_or_fetch(&key, &fetcher).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        cache.invalidate(&QueryKey::new(["contracts"])).await;
        let third = cache.get_or_fetch(&key, &fetcher).await.unwrap();
        assert_eq!(third["fetch"], 2);
        assert_eq!(cache.is_stale(&key).await, Some(false));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_entry_stale() {
        let cache = QueryCache::new();
        let key = QueryKey::new(["budgets", "u1"]);
        cache.insert(key.clone(), json!(["cached"])).await;
        cache.invalidate(&key).await;

        assert!(cache.get_or_fetch(&key, &FailingFetcher).await.is_err());

        let entry = cache.get(&key).await.unwrap();
        assert!(entry.stale);
        assert_eq!(entry.value, json!(["cached"]));
    }

    #[tokio::test]
    async fn test_clear_drops_entries() {
        let cache = QueryCache::new();
        cache.insert(QueryKey::new(["income", "u1"]), json!([])).await;
        cache.clear().await;
        assert!(cache.keys().await.is_empty());
    }
}
