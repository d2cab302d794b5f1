//! ClickHouse segment store.

pub mod client;
pub mod config;
pub mod health;
pub mod repository;
pub mod schema;

pub use client::*;
pub use config::*;
pub use repository::*;
