//! API routes and handlers
//!
//! This module defines all API endpoints and their routing.

use axum::{routing::get, Router};

use crate::AppState;

mod certificate_service;
mod certificates;
mod health;

pub use health::*;

/// Redfish service prefix for every protected route
pub const REDFISH_PREFIX: &str = "/redfish/v1";

/// Public API routes (no authentication required)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
}

/// Protected API routes (authentication required)
pub fn protected_routes() -> Router<AppState> {
    Router::new().nest(
        REDFISH_PREFIX,
        Router::new()
            .merge(certificate_service::routes())
            .merge(certificates::routes()),
    )
}

/// Create the full API router (public + protected; useful for tests)
pub fn routes() -> Router<AppState> {
    public_routes().merge(protected_routes())
}
