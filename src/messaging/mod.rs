// Messaging module - Event handling and message routing
pub mod event;
pub mod router;

pub use event::{ChannelEvent, SystemEvent};
pub use router::MessageRouter;
