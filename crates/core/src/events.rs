//! Segment membership events and the request shapes that create them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, Result};

/// A user registered into a segment.
///
/// Wire form is one JSON object per broker message:
/// `{"UserID":"u1","Segment":"s1","RegisteredAt":1700000000}`.
/// Decoding also accepts snake_case keys, and a missing timestamp decodes as 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEvent {
    #[serde(rename = "UserID", alias = "user_id")]
    pub user_id: String,
    #[serde(rename = "Segment", alias = "segment")]
    pub segment: String,
    /// Unix seconds.
    #[serde(rename = "RegisteredAt", alias = "registered_at", default)]
    pub registered_at: u32,
}

impl SegmentEvent {
    /// Creates an event stamped with the current time.
    pub fn new(user_id: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            segment: segment.into(),
            registered_at: unix_now(),
        }
    }

    pub fn with_registered_at(mut self, registered_at: u32) -> Self {
        self.registered_at = registered_at;
        self
    }

    /// Serializes the event to its wire form.
    ///
    /// Field order follows the struct declaration, so equal events always
    /// produce identical bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses one broker payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Current unix time in seconds, saturated into `u32`.
pub fn unix_now() -> u32 {
    Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

/// Body of the write endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AddUserSegmentRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "segment is required"))]
    pub segment: String,
}

impl AddUserSegmentRequest {
    pub fn new(user_id: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            segment: segment.into(),
        }
    }

    /// Validates the request and turns it into a timestamped event.
    pub fn into_event(self) -> Result<SegmentEvent> {
        self.validate()
            .map_err(|e| Error::validation(format!("{}", e)))?;
        Ok(SegmentEvent::new(self.user_id, self.segment))
    }
}

/// Body of the read endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct EstimateUsersRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "segment is required"))]
    pub segment: String,
}

impl EstimateUsersRequest {
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
        }
    }

    /// Returns the segment name once the request is known to be valid.
    pub fn segment(&self) -> Result<&str> {
        self.validate()
            .map_err(|e| Error::validation(format!("{}", e)))?;
        Ok(&self.segment)
    }
}

/// Reply of the read endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateUsersResponse {
    pub count: u32,
}
