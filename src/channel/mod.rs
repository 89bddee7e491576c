// Module declarations
mod config;
mod core;
mod postgres_changes;
pub mod push;
mod state;

// Public API exports
pub use config::{ChannelJoinConfig, JoinPayload, PostgresChangesConfig};
pub use core::{RealtimeChannel, RealtimeChannelOptions};
pub use postgres_changes::{
    PostgresChangeEvent, PostgresChangesFilter, PostgresChangesPayload,
    PostgresChangesPayloadBase, PostgresDeletePayload, PostgresInsertPayload,
    PostgresUpdatePayload,
};
pub use push::{Push, PushReply};
pub use state::{ChannelLifecycle, ChannelState, ChannelStatus, ChannelUpdate};
