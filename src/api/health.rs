//! Health check endpoints
//!
//! Provides health check endpoints for monitoring and load balancers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::services::certs::paths::{CERTS_BASE_PATH, CERTIFICATE_INTERFACE};
use crate::services::csr::CsrStats;
use crate::AppState;

/// Basic health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Detailed health response with component status
#[derive(Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub version: String,
    pub components: ComponentHealth,
    pub csr: CsrHealth,
}

/// Health status of individual components
#[derive(Serialize)]
pub struct ComponentHealth {
    pub bus: ComponentStatus,
}

/// CSR coordinator state
#[derive(Serialize)]
pub struct CsrHealth {
    pub slot: SlotHealth,
    pub stats: CsrStats,
}

/// Whether a CSR session holds the slot; session details stay private
#[derive(Serialize)]
pub struct SlotHealth {
    pub active: bool,
}

/// Status of a single component
#[derive(Serialize)]
pub struct ComponentStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: None,
        }
    }

    fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
        }
    }
}

/// Simple health check endpoint (for load balancers)
///
/// Returns 200 OK if the service is running.
/// Does not check component health.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Detailed health check endpoint
///
/// Enumerates the certificate objects to confirm the bus answers, and
/// reports the CSR slot and session counters.
/// Returns 200 if the bus is reachable, 503 otherwise.
pub async fn health_check_detailed(
    State(state): State<AppState>,
) -> (StatusCode, Json<DetailedHealthResponse>) {
    let bus_status = match state
        .bus
        .get_subtree_paths(CERTS_BASE_PATH, 0, &[CERTIFICATE_INTERFACE])
        .await
    {
        Ok(_) => ComponentStatus::healthy(),
        Err(e) => ComponentStatus::unhealthy(e.to_string()),
    };

    let overall_healthy = bus_status.status == "healthy";
    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = DetailedHealthResponse {
        status: if overall_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        components: ComponentHealth { bus: bus_status },
        csr: CsrHealth {
            slot: SlotHealth {
                active: state.csr.state().active,
            },
            stats: state.csr.stats(),
        },
    };

    (status_code, Json(response))
}
