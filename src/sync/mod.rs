//! Keeps a query cache consistent with a per-user change feed.
//!
//! [`RealtimeSync`] opens one [`SubscriptionHandle`] per watched table for the
//! signed-in user. Each subscription fans its [`FeedMessage`]s out to two
//! independent consumers: the status board, which derives the
//! [`ConnectionState`] shown to the user, and the [`CacheInvalidator`], which
//! marks affected [`QueryCache`] entries stale and raises insert toasts.

pub mod cache;
pub mod config;
pub mod event;
pub mod feed;
pub mod invalidator;
pub mod notify;
pub mod session;
pub mod status;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CachedValue, QueryCache, QueryFetcher, QueryKey};
pub use config::{LocalizedText, NotificationTemplate, SyncOptions, WatchedTable};
pub use event::{ChangeEvent, FeedMessage, FeedStatus, Row, RowChange, RowId};
pub use feed::{ChangeFeed, SubscriptionHandle, UserId};
pub use invalidator::{CacheInvalidator, NotificationLedger};
pub use notify::{LogNotifier, Locale, Notifier, Toast, ToastNotifier};
pub use session::RealtimeSync;
pub use status::{ConnectionState, ConnectionStatusTracker, StatusBoard};
pub use transport::{ChangeTransport, FeedRequest, TransportEvent, TransportSubscription};
