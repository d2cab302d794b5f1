//! Redpanda consumer group, batch assembly, and producer gateway.

pub mod batch;
pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod health;
pub mod producer;
pub mod source;

pub use batch::*;
pub use config::*;
pub use consumer::*;
pub use error::{RedpandaError, Result};
pub use producer::*;
pub use source::*;
