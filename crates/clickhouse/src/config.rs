//! ClickHouse configuration.

use serde::{Deserialize, Serialize};

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    pub url: String,
    /// Database name
    #[serde(default = "default_database")]
    pub database: String,
    /// Username (optional)
    #[serde(default)]
    pub username: Option<String>,
    /// Password (optional)
    #[serde(default)]
    pub password: Option<String>,
    /// Table receiving raw segment rows
    #[serde(default = "default_table")]
    pub table: String,
    /// Aggregate view queried for counts
    #[serde(default = "default_view")]
    pub view: String,
    /// Query timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Create the table and view at startup
    #[serde(default)]
    pub init_schema: bool,
}

fn default_database() -> String {
    "default".to_string()
}

fn default_table() -> String {
    "user_segments".to_string()
}

fn default_view() -> String {
    "segment_counts".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: default_database(),
            username: None,
            password: None,
            table: default_table(),
            view: default_view(),
            timeout_secs: default_timeout_secs(),
            init_schema: false,
        }
    }
}
