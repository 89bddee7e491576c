//! # Ledger Realtime
//!
//! Realtime cache consistency for the ledger app: a Phoenix Channels client for
//! Supabase Realtime `postgres_changes`, and a sync layer that turns each
//! signed-in user's row changes into stale query-cache entries, a connection
//! status indicator and change toasts.
//!
//! ## Example
//!
//! ```no_run
//! use ledger_realtime::sync::{RealtimeSync, SyncOptions, ToastNotifier, UserId};
//! use ledger_realtime::{QueryCache, RealtimeClient, RealtimeClientOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RealtimeClient::new(
//!         "wss://your-project.supabase.co/realtime/v1",
//!         RealtimeClientOptions {
//!             api_key: "your-anon-key".to_string(),
//!             ..Default::default()
//!         }
//!     )?;
//!
//!     let (notifier, mut toasts) = ToastNotifier::new();
//!     let mut sync = RealtimeSync::new(
//!         Arc::new(client),
//!         QueryCache::new(),
//!         Arc::new(notifier),
//!         SyncOptions::default(),
//!     );
//!     sync.set_identity(Some(UserId::new("user-id"))).await;
//!
//!     while let Some(toast) = toasts.recv().await {
//!         println!("{}", toast.message);
//!     }
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod client;
pub mod infrastructure;
pub mod messaging;
pub mod sync;
pub mod types;
pub mod websocket;

pub use channel::{
    ChannelLifecycle, PostgresChangeEvent, PostgresChangesFilter, RealtimeChannel,
    RealtimeChannelOptions,
};
pub use client::{RealtimeClient, RealtimeClientBuilder, RealtimeClientOptions};
pub use infrastructure::PostgrestFetcher;
pub use messaging::{ChannelEvent, SystemEvent};
pub use sync::{ConnectionState, QueryCache, QueryKey, RealtimeSync};
pub use types::{FeedError, RealtimeError, RealtimeMessage, Result};
