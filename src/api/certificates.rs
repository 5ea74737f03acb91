//! Certificate collection and item endpoints
//!
//! One collection per certificate domain:
//! - `/Managers/{manager_id}/NetworkProtocol/HTTPS/Certificates`
//! - `/AccountService/LDAP/Certificates`
//! - `/Managers/{manager_id}/Truststore/Certificates`
//!
//! HTTPS certificates cannot be deleted, only replaced.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, header::LOCATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::middleware::{AuthUser, Privilege};
use crate::models::InstallCertificateRequest;
use crate::services::certs::{CertificateDomain, CertificateView};
use crate::utils::error::AppError;
use crate::AppState;

/// Create certificate collection routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/Managers/{manager_id}/NetworkProtocol/HTTPS/Certificates",
            get(list_https).post(install_https),
        )
        .route(
            "/Managers/{manager_id}/NetworkProtocol/HTTPS/Certificates/{cert_id}",
            get(get_https),
        )
        .route(
            "/AccountService/LDAP/Certificates",
            get(list_ldap).post(install_ldap),
        )
        .route(
            "/AccountService/LDAP/Certificates/{cert_id}",
            get(get_ldap).delete(delete_ldap),
        )
        .route(
            "/Managers/{manager_id}/Truststore/Certificates",
            get(list_truststore).post(install_truststore),
        )
        .route(
            "/Managers/{manager_id}/Truststore/Certificates/{cert_id}",
            get(get_truststore).delete(delete_truststore),
        )
}

/// Certificate body with its `Location` header
pub(super) fn located(view: CertificateView) -> impl IntoResponse {
    ([(LOCATION, view.location)], Json(view.certificate))
}

/// Extract the certificate text from an install request.
///
/// A JSON body supplies `CertificateString` and an optional
/// `CertificateType`; anything else is taken verbatim as the certificate.
fn install_body(headers: &HeaderMap, body: &Bytes) -> Result<(String, Option<String>), AppError> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    if is_json {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
            let request: InstallCertificateRequest = serde_json::from_value(value)?;
            return Ok((request.certificate_string, request.certificate_type));
        }
    }

    let raw = String::from_utf8(body.to_vec()).map_err(|_| AppError::UnrecognizedRequestBody)?;
    Ok((raw, None))
}

async fn list(
    state: &AppState,
    auth_user: &AuthUser,
    domain: CertificateDomain,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(Privilege::ConfigureManager)?;
    let collection = state.certificates.list(domain).await?;
    Ok(Json(collection))
}

async fn fetch(
    state: &AppState,
    auth_user: &AuthUser,
    domain: CertificateDomain,
    cert_id: &str,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(Privilege::ConfigureManager)?;
    let view = state.certificates.get(domain, cert_id).await?;
    Ok(located(view))
}

async fn install(
    state: &AppState,
    auth_user: &AuthUser,
    domain: CertificateDomain,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(Privilege::ConfigureManager)?;
    let (certificate, certificate_type) = install_body(headers, body)?;
    let view = state
        .certificates
        .install(domain, &certificate, certificate_type.as_deref())
        .await?;
    Ok(located(view))
}

async fn remove(
    state: &AppState,
    auth_user: &AuthUser,
    domain: CertificateDomain,
    cert_id: &str,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(Privilege::ConfigureManager)?;
    state.certificates.delete(domain, cert_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /redfish/v1/Managers/:manager_id/NetworkProtocol/HTTPS/Certificates
async fn list_https(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(manager_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.certificates.check_manager(&manager_id)?;
    list(&state, &auth_user, CertificateDomain::ServerTransport).await
}

/// POST /redfish/v1/Managers/:manager_id/NetworkProtocol/HTTPS/Certificates
async fn install_https(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(manager_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    state.certificates.check_manager(&manager_id)?;
    install(&state, &auth_user, CertificateDomain::ServerTransport, &headers, &body).await
}

/// GET /redfish/v1/Managers/:manager_id/NetworkProtocol/HTTPS/Certificates/:cert_id
async fn get_https(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((manager_id, cert_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state.certificates.check_manager(&manager_id)?;
    fetch(&state, &auth_user, CertificateDomain::ServerTransport, &cert_id).await
}

/// GET /redfish/v1/AccountService/LDAP/Certificates
async fn list_ldap(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    list(&state, &auth_user, CertificateDomain::DirectoryClient).await
}

/// POST /redfish/v1/AccountService/LDAP/Certificates
async fn install_ldap(
    State(state): State<AppState>,
    auth_user: AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    install(&state, &auth_user, CertificateDomain::DirectoryClient, &headers, &body).await
}

/// GET /redfish/v1/AccountService/LDAP/Certificates/:cert_id
async fn get_ldap(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(cert_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    fetch(&state, &auth_user, CertificateDomain::DirectoryClient, &cert_id).await
}

/// DELETE /redfish/v1/AccountService/LDAP/Certificates/:cert_id
async fn delete_ldap(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(cert_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    remove(&state, &auth_user, CertificateDomain::DirectoryClient, &cert_id).await
}

/// GET /redfish/v1/Managers/:manager_id/Truststore/Certificates
async fn list_truststore(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(manager_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.certificates.check_manager(&manager_id)?;
    list(&state, &auth_user, CertificateDomain::TrustStoreAuthority).await
}

/// POST /redfish/v1/Managers/:manager_id/Truststore/Certificates
async fn install_truststore(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(manager_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    state.certificates.check_manager(&manager_id)?;
    install(&state, &auth_user, CertificateDomain::TrustStoreAuthority, &headers, &body).await
}

/// GET /redfish/v1/Managers/:manager_id/Truststore/Certificates/:cert_id
async fn get_truststore(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((manager_id, cert_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state.certificates.check_manager(&manager_id)?;
    fetch(&state, &auth_user, CertificateDomain::TrustStoreAuthority, &cert_id).await
}

/// DELETE /redfish/v1/Managers/:manager_id/Truststore/Certificates/:cert_id
async fn delete_truststore(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((manager_id, cert_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state.certificates.check_manager(&manager_id)?;
    remove(&state, &auth_user, CertificateDomain::TrustStoreAuthority, &cert_id).await
}
