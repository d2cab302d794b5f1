//! Internal telemetry for the segment engine.
//!
//! Structured logs go through `tracing`; health and pipeline counters are
//! kept in-process and surfaced on the `/health` endpoint.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
