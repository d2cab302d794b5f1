//! Shared helpers for the integration suites.

pub mod containers;
pub mod fixtures;
