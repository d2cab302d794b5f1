//! ClickHouse table schemas.
//!
//! - `user_segments`: one row per accepted membership event
//! - `segment_counts`: materialized view keeping one row per (segment, user)
//!
//! Table and view names come from configuration, so DDL is rendered at runtime.

use crate::client::ClickHouseClient;
use engine_core::{Error, Result};
use tracing::{debug, info};

/// SQL for creating the raw segment table.
pub fn create_segments_table(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    user_id LowCardinality(String),
    segment LowCardinality(String),
    registered_at UInt32,

    -- Metadata
    inserted_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
ORDER BY (segment, user_id, registered_at)
SETTINGS index_granularity = 8192
"#
    )
}

/// SQL for creating the per-segment membership view.
///
/// Duplicate registrations of the same user collapse on merge, keeping the
/// latest `registered_at`.
pub fn create_segment_counts_view(view: &str, table: &str) -> String {
    format!(
        r#"
CREATE MATERIALIZED VIEW IF NOT EXISTS {view}
ENGINE = ReplacingMergeTree(registered_at)
ORDER BY (segment, user_id)
AS SELECT
    segment,
    user_id,
    registered_at
FROM {table}
"#
    )
}

/// All DDL statements in dependency order.
pub fn all_statements(table: &str, view: &str) -> Vec<String> {
    vec![
        create_segments_table(table),
        create_segment_counts_view(view, table),
    ]
}

/// Creates the configured table and view if they do not exist.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    let config = client.config();

    for ddl in all_statements(&config.table, &config.view) {
        client
            .inner()
            .query(&ddl)
            .execute()
            .await
            .map_err(|e| Error::storage(format!("Failed to execute DDL: {}", e)))?;
        debug!(ddl = %ddl.trim(), "Executed DDL");
    }

    info!(
        table = %config.table,
        view = %config.view,
        "ClickHouse schema initialized"
    );
    Ok(())
}
