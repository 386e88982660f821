//! Error types and handling
//!
//! Every failure of a backend collaborator is converted into an [`AppError`].
//! The editor catches these at the call site and turns them into inline notices,
//! so none of them escape as unhandled faults.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::models::ShapeError;

/// Application error types
#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// No session, or the backend rejected its credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected locally or by the backend (400/422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend answered with a failure status
    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    /// Request timed out
    #[error("Backend request timed out")]
    Timeout,

    /// Could not reach the backend
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend answered with a body we cannot use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable identifier for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Backend { .. } => "backend_error",
            AppError::Timeout => "timeout",
            AppError::Connection(_) => "connection_error",
            AppError::InvalidResponse(_) => "invalid_response",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Map a non-success HTTP status and body to an error
    pub fn from_status(status: u16, body: String) -> Self {
        let body = ErrorResponse::message_of(body);
        match status {
            401 | 403 => AppError::Unauthorized(body),
            404 => AppError::NotFound(body),
            400 | 422 => AppError::Validation(body),
            _ => {
                error!(status = status, body = %body, "Backend request failed");
                AppError::Backend {
                    status,
                    message: body,
                }
            }
        }
    }

    /// Message suitable for an inline, dismissable notice
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthorized(_) => "Your session has expired. Please sign in again.".to_string(),
            AppError::Timeout | AppError::Connection(_) => {
                "The server could not be reached. Please try again.".to_string()
            }
            AppError::Validation(msg) => msg.clone(),
            AppError::InvalidResponse(_) => {
                "The server returned an unexpected response. Please try again.".to_string()
            }
            _ => "Something went wrong. Please try again later.".to_string(),
        }
    }
}

/// JSON error body returned by the backend
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    /// Error type identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable error message
    #[serde(alias = "msg")]
    pub message: String,
    /// Additional error details (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Message carried by a response body, falling back to the raw text
    pub fn message_of(body: String) -> String {
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(parsed) => parsed.message,
            Err(_) => body,
        }
    }
}

// Implement From for common error types

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout
        } else if err.is_connect() {
            AppError::Connection("Failed to connect to backend".to_string())
        } else if err.is_decode() {
            AppError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            AppError::from_status(status.as_u16(), err.to_string())
        } else {
            AppError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidResponse(format!("JSON parsing error: {}", err))
    }
}

impl From<ShapeError> for AppError {
    fn from(err: ShapeError) -> Self {
        AppError::InvalidResponse(format!("Malformed rule tree: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Result type alias for backend operations
pub type AppResult<T> = Result<T, AppError>;
