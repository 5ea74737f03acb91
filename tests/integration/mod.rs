//! Integration tests for Certgate
//!
//! These tests drive the full router, including authentication, against the
//! in-memory certificate managers.

mod certificate_api_tests;
mod csr_api_tests;
