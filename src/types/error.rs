use thiserror::Error;

/// Errors that can occur when talking to the realtime service.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// WebSocket protocol error (connection failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// General connection error with descriptive message
    #[error("Connection error: {0}")]
    Connection(String),

    /// Authentication or authorization error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Channel-specific error (subscription failed, invalid topic, etc.)
    #[error("Channel error: {0}")]
    Channel(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error (used when re-fetching rows over REST)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A query key could not be mapped to a backend read
    #[error("Invalid query key: {0}")]
    InvalidQueryKey(String),

    /// Invalid configuration value (e.g. from the environment)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out (e.g., join reply not received)
    #[error("Timeout error")]
    Timeout,

    /// Attempted operation while not connected to the server
    #[error("Not connected")]
    NotConnected,
}

/// Failures of the change feed.
///
/// These never reach callers of the sync layer. They are logged and surface only
/// as a `Disconnected` connection state (or a dropped event).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The channel never reached the subscribed state
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The channel was subscribed and is not anymore
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// A change payload was missing expected fields
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// Convenience type alias for `Result<T, RealtimeError>`.
pub type Result<T> = std::result::Result<T, RealtimeError>;
