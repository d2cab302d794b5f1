//! Segment store backed by ClickHouse.

use async_trait::async_trait;
use clickhouse::{sql::Identifier, Row};
use engine_core::{Error, Result, SegmentEvent, SegmentRepository};
use serde::Serialize;
use std::future::Future;
use std::time::Instant;
use tracing::debug;

use crate::client::ClickHouseClient;

/// One row of the segment table.
#[derive(Debug, Clone, Row, Serialize)]
pub struct SegmentRow {
    pub user_id: String,
    pub segment: String,
    pub registered_at: u32,
}

impl From<&SegmentEvent> for SegmentRow {
    fn from(event: &SegmentEvent) -> Self {
        Self {
            user_id: event.user_id.clone(),
            segment: event.segment.clone(),
            registered_at: event.registered_at,
        }
    }
}

/// [`SegmentRepository`] writing to the configured table and counting from the view.
#[derive(Clone)]
pub struct ClickHouseSegmentRepository {
    client: ClickHouseClient,
}

impl ClickHouseSegmentRepository {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }

    async fn with_timeout<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = clickhouse::error::Result<T>>,
    {
        let timeout = self.client.timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result.map_err(|e| Error::storage(format!("{op} error: {e}"))),
            Err(_) => Err(Error::storage(format!("{op} timed out after {timeout:?}"))),
        }
    }

    async fn insert_rows(&self, segments: &[SegmentEvent]) -> clickhouse::error::Result<()> {
        let mut insert = self
            .client
            .inner()
            .insert::<SegmentRow>(&self.client.config().table)?;

        for event in segments {
            insert.write(&SegmentRow::from(event)).await?;
        }

        insert.end().await
    }
}

#[async_trait]
impl SegmentRepository for ClickHouseSegmentRepository {
    async fn save_user_segments(&self, segments: &[SegmentEvent]) -> Result<()> {
        if segments.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        self.with_timeout("Insert", self.insert_rows(segments)).await?;

        debug!(
            table = %self.client.config().table,
            count = segments.len(),
            latency_ms = %start.elapsed().as_millis(),
            "Inserted segment rows"
        );

        Ok(())
    }

    async fn segment_users_count(&self, segment: &str) -> Result<u32> {
        let view = &self.client.config().view;

        let count = self
            .with_timeout(
                "Count",
                self.client
                    .inner()
                    .query("SELECT count() FROM ? WHERE segment = ?")
                    .bind(Identifier(view))
                    .bind(segment)
                    .fetch_optional::<u64>(),
            )
            .await?
            .unwrap_or(0);

        Ok(count.min(u32::MAX as u64) as u32)
    }
}
