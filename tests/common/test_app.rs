//! Test application setup utilities
//!
//! Provides utilities for setting up test instances of the application
//! backed by the in-memory certificate managers.

use std::sync::Arc;

use axum::{body::Body, http::Request, Router};
use tempfile::TempDir;
use tower::ServiceExt;

use certgate::{
    api,
    config::AppConfig,
    middleware::auth::{create_access_token, Privilege},
    services::MemoryBus,
    AppState,
};

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub bus: MemoryBus,
    /// Kept alive so staged files have somewhere to go
    pub staging: TempDir,
}

impl TestApp {
    /// Create a new test application with empty certificate managers
    pub fn new() -> Self {
        Self::with_bus(MemoryBus::new())
    }

    /// Create a test application over a pre-seeded bus
    pub fn with_bus(bus: MemoryBus) -> Self {
        let staging = TempDir::new().expect("Failed to create staging directory");
        let config = test_config(&staging);
        Self::with_config(config, bus, staging)
    }

    /// Create a new test application with custom configuration
    pub fn with_config(config: AppConfig, bus: MemoryBus, staging: TempDir) -> Self {
        let state = AppState::new(config, Arc::new(bus.clone()));

        // Same layering as the binary: only the Redfish tree is authenticated
        let router = Router::new()
            .merge(api::public_routes())
            .merge(
                api::protected_routes().layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    certgate::middleware::auth_middleware,
                )),
            )
            .with_state(state.clone());

        Self {
            router,
            state,
            bus,
            staging,
        }
    }

    /// Token carrying the given privileges
    pub fn token(&self, privileges: &[Privilege]) -> String {
        create_access_token(
            "tester",
            privileges.to_vec(),
            &self.state.config.auth.jwt_secret,
            1,
        )
        .expect("Failed to generate test token")
    }

    /// Token allowed to manage certificates
    pub fn admin_token(&self) -> String {
        self.token(&[Privilege::Login, Privilege::ConfigureManager])
    }

    /// Token that can log in but not manage certificates
    pub fn readonly_token(&self) -> String {
        self.token(&[Privilege::Login])
    }

    /// Make a GET request to the test application
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Make an authenticated GET request
    pub async fn get_auth(&self, uri: &str, token: &str) -> TestResponse {
        self.request_with_auth(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
            token,
        )
        .await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post_json(&self, uri: &str, body: serde_json::Value, token: &str) -> TestResponse {
        self.request_with_auth(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            token,
        )
        .await
    }

    /// Make an authenticated POST request with an opaque text body
    pub async fn post_text(&self, uri: &str, body: &str, token: &str) -> TestResponse {
        self.request_with_auth(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/x-pem-file")
                .body(Body::from(body.to_string()))
                .unwrap(),
            token,
        )
        .await
    }

    /// Make an authenticated DELETE request
    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.request_with_auth(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
            token,
        )
        .await
    }

    /// Make a request with authentication
    pub async fn request_with_auth(&self, request: Request<Body>, token: &str) -> TestResponse {
        let (mut parts, body) = request.into_parts();
        parts.headers.insert(
            "Authorization",
            format!("Bearer {}", token).parse().unwrap(),
        );
        self.request(Request::from_parts(parts, body)).await
    }

    /// Make an arbitrary request
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Number of entries left in the staging directory
    pub fn staged_entries(&self) -> usize {
        std::fs::read_dir(self.staging.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: axum::http::StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse response as JSON")
    }

    /// Value of a response header
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Registry message id from an error body
    pub fn message_id(&self) -> String {
        let json: serde_json::Value = self.json();
        json["code"]
            .as_str()
            .and_then(|code| code.rsplit('.').next())
            .unwrap_or_default()
            .to_string()
    }

    /// Assert the response status
    pub fn assert_status(&self, expected: axum::http::StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert the response status is OK (200)
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::OK)
    }

    /// Assert the response status is Bad Request (400)
    pub fn assert_bad_request(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::BAD_REQUEST)
    }

    /// Assert the response status is Unauthorized (401)
    pub fn assert_unauthorized(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::UNAUTHORIZED)
    }

    /// Assert the response status is Forbidden (403)
    pub fn assert_forbidden(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::FORBIDDEN)
    }

    /// Assert the response status is Not Found (404)
    pub fn assert_not_found(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::NOT_FOUND)
    }
}

/// Create a test configuration staging into `staging`
pub fn test_config(staging: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "test_secret_key_that_is_at_least_32_bytes_long".to_string();
    config.certificates.staging_dir = staging.path().to_path_buf();
    config.certificates.csr_timeout_secs = 2;
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = TestApp::new();
        let response = app.get("/health").await;
        response.assert_ok();
    }

    #[tokio::test]
    async fn test_response_json_parsing() {
        let app = TestApp::new();
        let response = app.get("/health").await;
        let json: serde_json::Value = response.json();
        assert!(json.get("status").is_some());
    }
}
