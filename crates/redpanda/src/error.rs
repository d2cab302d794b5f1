//! Broker-side errors.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RedpandaError>;

#[derive(Debug, Error)]
pub enum RedpandaError {
    #[error("kafka client error: {0}")]
    Client(#[from] rskafka::client::error::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("topic {0} has no partitions")]
    NoPartitions(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The consumer group or producer was closed; terminal.
    #[error("client closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("batch channel closed")]
    ChannelClosed,

    #[error("consumer already started")]
    AlreadyStarted,
}

impl RedpandaError {
    /// Whether retrying can never succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
