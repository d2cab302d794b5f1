//! Application state shared across handlers.

use engine_core::SegmentRepository;
use redpanda::EventPublisher;
use std::sync::Arc;

use crate::services::{EstimationService, SegmentationService};

/// Services served by this instance.
///
/// A role that is not configured leaves its service unset, and its routes
/// are not mounted.
#[derive(Clone, Default)]
pub struct AppState {
    pub segmentation: Option<Arc<SegmentationService>>,
    pub estimation: Option<Arc<EstimationService>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the write path through `publisher`.
    pub fn with_segmentation(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.segmentation = Some(Arc::new(SegmentationService::new(publisher)));
        self
    }

    /// Serve the read path from `repository`.
    pub fn with_estimation(mut self, repository: Arc<dyn SegmentRepository>) -> Self {
        self.estimation = Some(Arc::new(EstimationService::new(repository)));
        self
    }
}
