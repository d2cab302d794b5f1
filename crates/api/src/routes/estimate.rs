//! Read endpoint.

use axum::{body::Bytes, extract::State, Json};
use engine_core::{EstimateUsersRequest, EstimateUsersResponse};
use std::sync::Arc;
use tracing::warn;

use crate::response::ApiError;
use crate::services::EstimationService;

/// POST /v1/estimate - Count the users registered into a segment.
pub async fn estimate_users_handler(
    State(service): State<Arc<EstimationService>>,
    body: Bytes,
) -> Result<Json<EstimateUsersResponse>, ApiError> {
    let request: EstimateUsersRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Malformed estimate request");
        ApiError::bad_request("invalid request body")
    })?;

    let response = service.segment_users_count(request).await?;
    Ok(Json(response))
}
