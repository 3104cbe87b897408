//! The `error` module defines the error type shared by every `chatrelay`
//! component.
//!
//! Backend failures (store, cache, log) are reported per step and never
//! roll back earlier steps, so most callers inspect the variant to decide
//! whether to continue. Only `LogTransport` on the consumer fetch path and
//! `Bootstrap` at startup are treated as fatal.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    /// The durable log could not be read. Fatal for the consumer loop.
    #[error("log transport error: {0}")]
    LogTransport(String),

    #[error("commit of offset {offset} rejected: position is already {committed}")]
    CommitRegression { offset: u64, committed: u64 },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("invalid message: {0}")]
    Validation(String),

    #[error("connection hub is no longer running")]
    HubClosed,

    #[error("bootstrap failed after {attempts} attempts: {reason}")]
    Bootstrap { attempts: u32, reason: String },
}

impl From<tungstenite::Error> for ChatError {
    fn from(err: tungstenite::Error) -> Self {
        ChatError::WebSocket(Box::new(err))
    }
}
