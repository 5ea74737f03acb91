//! Error types and handling
//!
//! This module provides the error framework for the gateway. Every failure a
//! handler can produce is an [`AppError`] variant, and every variant renders
//! to a consistent JSON body carrying a Redfish base-registry message id.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Message registry prefix used in the `code` field of error bodies
const REGISTRY_PREFIX: &str = "Base.1.19";

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("The requested resource of type {kind} named '{id}' was not found.")]
    ResourceNotFound { kind: String, id: String },

    /// A written value was rejected by the backing service (400)
    #[error(
        "The property '{property}' with the requested value of '{value}' could not be written \
         because the value does not meet the constraints of the implementation."
    )]
    PropertyValueIncorrect { property: String, value: String },

    /// Value is outside the accepted set (400)
    #[error("The value '{value}' for the property {property} is not in the list of acceptable values.")]
    PropertyValueNotInList { property: String, value: String },

    /// Action parameter is not supported for this target (400)
    #[error("The parameter {parameter} for the action {action} is not supported on the target resource.")]
    ActionParameterNotSupported { parameter: String, action: String },

    /// Action parameter could not be parsed (400)
    #[error(
        "The value '{value}' for the parameter {parameter} in the action {action} is of a \
         different format than the parameter can accept."
    )]
    ActionParameterValueFormatError {
        value: String,
        parameter: String,
        action: String,
    },

    /// Required property missing from the request body (400)
    #[error("The property {0} is a required property and must be included in the request.")]
    PropertyMissing(String),

    /// Request body could not be interpreted (400)
    #[error("The service detected a malformed request body that it was unable to interpret.")]
    UnrecognizedRequestBody,

    /// Authentication required (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller lacks the privilege for this operation (403)
    #[error(
        "There are insufficient privileges for the account or credentials associated with the \
         current session to perform the requested operation."
    )]
    InsufficientPrivilege,

    /// Single-flight operation already running, retry later (503)
    #[error("The service is temporarily unavailable.  Retry in {retry_after_secs} seconds.")]
    ServiceTemporarilyUnavailable { retry_after_secs: u64 },

    /// Internal server error (500). The detail is logged, never returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Message registry id for programmatic handling (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            code: None,
        }
    }

    /// Add details to the error response
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Add an error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl AppError {
    /// Shorthand for a missing certificate
    pub fn certificate_not_found(id: impl Into<String>) -> Self {
        AppError::ResourceNotFound {
            kind: "Certificate".to_string(),
            id: id.into(),
        }
    }

    /// Redfish base-registry message id for this error
    pub fn message_id(&self) -> &'static str {
        match self {
            AppError::ResourceNotFound { .. } => "ResourceNotFound",
            AppError::PropertyValueIncorrect { .. } => "PropertyValueIncorrect",
            AppError::PropertyValueNotInList { .. } => "PropertyValueNotInList",
            AppError::ActionParameterNotSupported { .. } => "ActionParameterNotSupported",
            AppError::ActionParameterValueFormatError { .. } => "ActionParameterValueFormatError",
            AppError::PropertyMissing(_) => "PropertyMissing",
            AppError::UnrecognizedRequestBody => "UnrecognizedRequestBody",
            AppError::Unauthorized(_) => "NoValidSession",
            AppError::InsufficientPrivilege => "InsufficientPrivilege",
            AppError::ServiceTemporarilyUnavailable { .. } => "ServiceTemporarilyUnavailable",
            AppError::Internal(_) => "InternalError",
        }
    }

    /// Message shown to the client
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => {
                "The request failed due to an internal service error.  The service is still operational."
                    .to_string()
            }
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::ResourceNotFound { kind, id } => {
                Some(serde_json::json!({ "resource_type": kind, "resource_id": id }))
            }
            AppError::PropertyValueIncorrect { property, .. }
            | AppError::PropertyValueNotInList { property, .. } => {
                Some(serde_json::json!({ "property": property }))
            }
            AppError::ActionParameterNotSupported { parameter, action }
            | AppError::ActionParameterValueFormatError {
                parameter, action, ..
            } => Some(serde_json::json!({ "parameter": parameter, "action": action })),
            AppError::PropertyMissing(property) => {
                Some(serde_json::json!({ "property": property }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, should_log) = match &self {
            AppError::ResourceNotFound { .. } => (StatusCode::NOT_FOUND, "not_found", false),
            AppError::PropertyValueIncorrect { .. }
            | AppError::PropertyValueNotInList { .. }
            | AppError::ActionParameterNotSupported { .. }
            | AppError::ActionParameterValueFormatError { .. }
            | AppError::PropertyMissing(_)
            | AppError::UnrecognizedRequestBody => (StatusCode::BAD_REQUEST, "bad_request", false),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", false),
            AppError::InsufficientPrivilege => (StatusCode::FORBIDDEN, "forbidden", true),
            AppError::ServiceTemporarilyUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", false)
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", true),
        };

        // Log server errors
        if should_log {
            error!(error = %self, error_type = error_type, "Request error");
        }

        let mut body = ErrorResponse::new(error_type, self.public_message())
            .with_code(format!("{}.{}", REGISTRY_PREFIX, self.message_id()));
        if let Some(details) = self.details() {
            body = body.with_details(details);
        }

        let mut response = (status, Json(body)).into_response();
        if let AppError::ServiceTemporarilyUnavailable { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

// Implement From for common error types

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(_: serde_json::Error) -> Self {
        AppError::UnrecognizedRequestBody
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
