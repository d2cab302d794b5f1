//! Core types, validation, and storage contracts for the segment engine.

pub mod error;
pub mod events;
pub mod repository;

pub use error::{Error, ErrorCode, Result};
pub use events::*;
pub use repository::*;
