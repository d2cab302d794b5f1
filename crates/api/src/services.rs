//! Write and read use cases behind the HTTP handlers.

use engine_core::{
    AddUserSegmentRequest, Error, EstimateUsersRequest, EstimateUsersResponse, Result,
    SegmentRepository,
};
use redpanda::EventPublisher;
use std::sync::Arc;
use tracing::{debug, error};

/// Validates membership requests and publishes them as events.
pub struct SegmentationService {
    publisher: Arc<dyn EventPublisher>,
}

impl SegmentationService {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    /// Publishes one membership event. Invalid requests never reach the broker.
    pub async fn add_user_segment(&self, request: AddUserSegmentRequest) -> Result<()> {
        let event = request.into_event()?;

        self.publisher.publish(&event).await.map_err(|e| {
            error!(
                user_id = %event.user_id,
                segment = %event.segment,
                error = %e,
                "error on producing"
            );
            Error::internal(e.to_string())
        })?;

        debug!(user_id = %event.user_id, segment = %event.segment, "Segment event accepted");
        Ok(())
    }
}

/// Answers segment cardinality queries from the store.
pub struct EstimationService {
    repository: Arc<dyn SegmentRepository>,
}

impl EstimationService {
    pub fn new(repository: Arc<dyn SegmentRepository>) -> Self {
        Self { repository }
    }

    pub async fn segment_users_count(
        &self,
        request: EstimateUsersRequest,
    ) -> Result<EstimateUsersResponse> {
        let segment = request.segment()?;

        let count = self
            .repository
            .segment_users_count(segment)
            .await
            .map_err(|e| {
                error!(segment = %segment, error = %e, "error getting segment users count");
                e
            })?;

        Ok(EstimateUsersResponse { count })
    }
}
