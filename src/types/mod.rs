pub mod constants;
pub mod error;
pub mod message;

pub use constants::*;
pub use error::{FeedError, RealtimeError, Result};
pub use message::RealtimeMessage;
