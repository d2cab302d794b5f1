//! Storage contract between the pipeline and the columnar store.

use async_trait::async_trait;

use crate::error::Result;
use crate::events::SegmentEvent;

/// Bulk writer and count reader for segment membership rows.
#[async_trait]
pub trait SegmentRepository: Send + Sync {
    /// Inserts all records in a single bulk call.
    async fn save_user_segments(&self, segments: &[SegmentEvent]) -> Result<()>;

    /// Number of users currently counted for `segment`; zero when absent.
    async fn segment_users_count(&self, segment: &str) -> Result<u32>;
}
