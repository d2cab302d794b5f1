//! Write endpoint.

use axum::{body::Bytes, extract::State, Json};
use engine_core::AddUserSegmentRequest;
use std::sync::Arc;
use tracing::warn;

use crate::response::{AddUserSegmentResponse, ApiError};
use crate::services::SegmentationService;

/// POST /v1/segments - Register a user into a segment.
///
/// The body is parsed by hand so malformed JSON maps to INVALID_ARGUMENT
/// instead of axum's default rejection.
pub async fn add_user_segment_handler(
    State(service): State<Arc<SegmentationService>>,
    body: Bytes,
) -> Result<Json<AddUserSegmentResponse>, ApiError> {
    let request: AddUserSegmentRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Malformed add segment request");
        ApiError::bad_request("invalid request body")
    })?;

    service.add_user_segment(request).await?;

    Ok(Json(AddUserSegmentResponse::default()))
}
