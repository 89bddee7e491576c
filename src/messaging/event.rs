use crate::types::constants::{channel_events, phoenix_events};
use serde::{Deserialize, Serialize};

/// Type-safe channel events
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ChannelEvent {
    /// PostgreSQL database changes
    PostgresChanges,

    /// Server-side system notices (postgres subscription status, etc.)
    System(SystemEvent),

    /// Anything this client does not interpret
    Custom(String),
}

impl ChannelEvent {
    /// Parse a wire string into a ChannelEvent
    pub fn parse(s: &str) -> Self {
        match s {
            channel_events::POSTGRES_CHANGES => Self::PostgresChanges,
            _ => match SystemEvent::parse(s) {
                Some(sys) => Self::System(sys),
                None => Self::Custom(s.to_string()),
            },
        }
    }

    /// Convert event to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::PostgresChanges => channel_events::POSTGRES_CHANGES,
            Self::System(sys) => sys.as_str(),
            Self::Custom(s) => s,
        }
    }
}

impl From<&str> for ChannelEvent {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for ChannelEvent {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ChannelEvent> for String {
    fn from(event: ChannelEvent) -> Self {
        event.as_str().to_string()
    }
}

impl From<SystemEvent> for ChannelEvent {
    fn from(event: SystemEvent) -> Self {
        Self::System(event)
    }
}

impl std::fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phoenix system events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEvent {
    /// Join channel
    Join,

    /// Leave channel
    Leave,

    /// Reply to a message
    Reply,

    /// Close channel
    Close,

    /// Error event
    Error,

    /// Heartbeat
    Heartbeat,
}

impl SystemEvent {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            phoenix_events::JOIN => Some(Self::Join),
            phoenix_events::LEAVE => Some(Self::Leave),
            phoenix_events::REPLY => Some(Self::Reply),
            phoenix_events::CLOSE => Some(Self::Close),
            phoenix_events::ERROR => Some(Self::Error),
            phoenix_events::HEARTBEAT => Some(Self::Heartbeat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => phoenix_events::JOIN,
            Self::Leave => phoenix_events::LEAVE,
            Self::Reply => phoenix_events::REPLY,
            Self::Close => phoenix_events::CLOSE,
            Self::Error => phoenix_events::ERROR,
            Self::Heartbeat => phoenix_events::HEARTBEAT,
        }
    }
}
