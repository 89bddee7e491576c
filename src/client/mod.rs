// Module declarations
mod builder;
mod connection;
mod core;
mod state;

// Public API exports
pub use builder::{RealtimeClientBuilder, RealtimeClientOptions};
pub use connection::{ConnectionManager, SocketState};
pub use core::RealtimeClient;
pub use state::ClientState;
