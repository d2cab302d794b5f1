//! Background workers for the segment engine.
//!
//! - Coordinator (Redpanda batches → ClickHouse pipeline)

pub mod coordinator;

pub use coordinator::*;
