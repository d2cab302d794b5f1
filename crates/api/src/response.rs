//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use engine_core::ErrorCode;
use serde::{Deserialize, Serialize};
use telemetry::{HealthReport, MetricsSnapshot};

/// Message returned for every internal failure; details stay in the logs.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// Empty success body of the write endpoint.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AddUserSegmentResponse {}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub metrics: MetricsSnapshot,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            response: ErrorResponse::new(msg, code.code()),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::InvalidArgument, msg)
    }

    pub fn internal() -> Self {
        Self::from_code(ErrorCode::Internal, INTERNAL_ERROR_MESSAGE)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<engine_core::Error> for ApiError {
    fn from(err: engine_core::Error) -> Self {
        match err {
            engine_core::Error::Validation(msg) => ApiError::bad_request(msg),
            _ => ApiError::internal(),
        }
    }
}
