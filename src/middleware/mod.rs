//! Middleware components
//!
//! This module contains middleware for:
//! - Authentication (JWT)
//! - Privilege checks

pub mod auth;

pub use auth::{auth_middleware, AuthUser, Claims, Privilege};
