//! CertificateService endpoints
//!
//! The service root, the cross-domain locations listing, and the
//! ReplaceCertificate and GenerateCSR actions.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use super::certificates::located;
use crate::middleware::{AuthUser, Privilege};
use crate::models::{CertificateServiceRoot, GenerateCsrRequest, ReplaceCertificateRequest};
use crate::utils::error::AppError;
use crate::AppState;

/// Create CertificateService routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/CertificateService", get(service_root))
        .route(
            "/CertificateService/CertificateLocations",
            get(certificate_locations),
        )
        .route(
            "/CertificateService/Actions/CertificateService.ReplaceCertificate",
            post(replace_certificate),
        )
        .route(
            "/CertificateService/Actions/CertificateService.GenerateCSR",
            post(generate_csr),
        )
}

/// GET /redfish/v1/CertificateService - Service root
async fn service_root(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(Privilege::Login)?;

    Ok(Json(CertificateServiceRoot::new(
        state.certificates.allowed_types(),
        auth_user.has(Privilege::ConfigureManager),
    )))
}

/// GET /redfish/v1/CertificateService/CertificateLocations - All installed certificates
async fn certificate_locations(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(Privilege::ConfigureManager)?;
    let locations = state.certificates.list_locations().await?;
    Ok(Json(locations))
}

/// POST /redfish/v1/CertificateService/Actions/CertificateService.ReplaceCertificate
async fn replace_certificate(
    State(state): State<AppState>,
    auth_user: AuthUser,
    payload: Result<Json<ReplaceCertificateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(Privilege::ConfigureManager)?;
    let Json(request) = payload.map_err(|_| AppError::UnrecognizedRequestBody)?;

    let view = state.certificates.replace(request).await?;
    info!(user = %auth_user.username, location = %view.location, "Certificate replaced");
    Ok(located(view))
}

/// POST /redfish/v1/CertificateService/Actions/CertificateService.GenerateCSR
async fn generate_csr(
    State(state): State<AppState>,
    auth_user: AuthUser,
    payload: Result<Json<GenerateCsrRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(Privilege::ConfigureManager)?;
    let Json(request) = payload.map_err(|_| AppError::UnrecognizedRequestBody)?;

    let response = state.csr.generate(request).await?;
    Ok(Json(response))
}
