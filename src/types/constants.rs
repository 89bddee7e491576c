/// Phoenix protocol event strings (magic strings layer)
pub mod phoenix_events {
    pub const CLOSE: &str = "phx_close";
    pub const ERROR: &str = "phx_error";
    pub const JOIN: &str = "phx_join";
    pub const REPLY: &str = "phx_reply";
    pub const LEAVE: &str = "phx_leave";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Phoenix protocol topics
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Prefix the server expects on every channel topic
pub const TOPIC_PREFIX: &str = "realtime:";

/// Channel event strings (magic strings layer)
pub mod channel_events {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const POSTGRES_CHANGES: &str = "postgres_changes";
    pub const SYSTEM: &str = "system";
}

/// Reply statuses carried in `phx_reply` payloads
pub mod reply_status {
    pub const OK: &str = "ok";
    pub const ERROR: &str = "error";
}

/// Postgres change categories accepted in `postgres_changes` bindings
pub mod postgres_events {
    pub const ALL: &str = "*";
    pub const INSERT: &str = "INSERT";
    pub const UPDATE: &str = "UPDATE";
    pub const DELETE: &str = "DELETE";
}

/// Protocol version
pub const VSN: &str = "1.0.0";

/// Default schema for watched tables
pub const DEFAULT_SCHEMA: &str = "public";

/// Column carrying row ownership on every watched table
pub const OWNER_COLUMN: &str = "user_id";

/// Default timeout (milliseconds)
pub const DEFAULT_TIMEOUT: u64 = 10000;

/// Default heartbeat interval (milliseconds)
pub const HEARTBEAT_INTERVAL: u64 = 25000;

/// Default reconnect intervals (milliseconds)
pub const RECONNECT_INTERVALS: [u64; 4] = [1000, 2000, 5000, 10000];
pub const DEFAULT_RECONNECT_FALLBACK: u64 = 10000;

/// Per-listener buffer between a channel and its bindings
pub const BINDING_BUFFER_SIZE: usize = 100;

/// Broadcast buffer between a subscription and its consumers
pub const FEED_BUFFER_SIZE: usize = 256;

/// Broadcast buffer for cache invalidation announcements
pub const INVALIDATION_BUFFER_SIZE: usize = 256;

/// Number of notified events remembered for de-duplication
pub const NOTIFICATION_LEDGER_CAPACITY: usize = 1024;
