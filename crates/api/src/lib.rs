//! HTTP API layer for the segment engine.

pub mod response;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::router;
pub use services::{EstimationService, SegmentationService};
pub use state::AppState;
