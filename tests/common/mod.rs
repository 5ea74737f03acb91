//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - Certificate and request fixtures
//! - API test client over an in-memory bus

pub mod test_app;

pub use fixtures::*;
pub use test_app::*;
