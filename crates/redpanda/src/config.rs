//! Redpanda configuration.

use rskafka::client::{consumer::StartOffset, partition::Compression};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::batch::BatchConfig;

/// Where a partition with no recorded position starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    #[default]
    Earliest,
    Latest,
}

impl From<StartPosition> for StartOffset {
    fn from(position: StartPosition) -> Self {
        match position {
            StartPosition::Earliest => StartOffset::Earliest,
            StartPosition::Latest => StartOffset::Latest,
        }
    }
}

/// Redpanda producer and consumer group configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// Topic carrying one segment event per message
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Consumer group id
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Messages per batch before a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Flush partially filled batches after this long (0 disables)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Capacity of the channel shared by all partition assemblers
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Compression type (none, gzip, snappy, lz4)
    #[serde(default = "default_compression")]
    pub compression: String,
    /// Produce request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_fetch_min_bytes")]
    pub fetch_min_bytes: i32,
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: i32,
    #[serde(default = "default_fetch_max_wait_ms")]
    pub fetch_max_wait_ms: i32,
    /// Start position for partitions without a recorded position
    #[serde(default)]
    pub start_offset: StartPosition,
    /// How often the partition assignment is re-read
    #[serde(default = "default_metadata_refresh_ms")]
    pub metadata_refresh_ms: u64,
    /// Pause before re-joining after a failed session
    #[serde(default = "default_rejoin_backoff_ms")]
    pub rejoin_backoff_ms: u64,
    /// SASL username (for cloud authentication)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password (for cloud authentication)
    #[serde(default)]
    pub sasl_password: Option<String>,
}

fn default_topic() -> String {
    "user-segments".to_string()
}

fn default_group_id() -> String {
    "segment-estimation".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    1000
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_fetch_min_bytes() -> i32 {
    1
}

fn default_fetch_max_bytes() -> i32 {
    1024 * 1024
}

fn default_fetch_max_wait_ms() -> i32 {
    500
}

fn default_metadata_refresh_ms() -> u64 {
    30_000
}

fn default_rejoin_backoff_ms() -> u64 {
    1000
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: default_topic(),
            group_id: default_group_id(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            channel_capacity: default_channel_capacity(),
            compression: default_compression(),
            request_timeout_ms: default_request_timeout_ms(),
            fetch_min_bytes: default_fetch_min_bytes(),
            fetch_max_bytes: default_fetch_max_bytes(),
            fetch_max_wait_ms: default_fetch_max_wait_ms(),
            start_offset: StartPosition::default(),
            metadata_refresh_ms: default_metadata_refresh_ms(),
            rejoin_backoff_ms: default_rejoin_backoff_ms(),
            sasl_username: None,
            sasl_password: None,
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    pub fn compression(&self) -> Compression {
        match self.compression.as_str() {
            "gzip" => Compression::Gzip,
            "snappy" => Compression::Snappy,
            "lz4" => Compression::Lz4,
            _ => Compression::NoCompression,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn metadata_refresh(&self) -> Duration {
        Duration::from_millis(self.metadata_refresh_ms.max(1))
    }

    pub fn rejoin_backoff(&self) -> Duration {
        Duration::from_millis(self.rejoin_backoff_ms)
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_size: self.batch_size.max(1),
            flush_interval: (self.flush_interval_ms > 0)
                .then(|| Duration::from_millis(self.flush_interval_ms)),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.sasl_username.is_some() && self.sasl_password.is_some()
    }
}
