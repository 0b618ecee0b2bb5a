//! Error Types for the chartmill server
//!
//! This module defines error handling for the HTTP layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversions from the core error taxonomy
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chartmill_core::{ChartmillError, ConfigError, IndexError, ParseError, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Uploaded package could not be parsed
    InvalidChart,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// No route matched the request
    RouteNotFound,

    /// Requested storage object does not exist
    ObjectNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// A package with the same name and version already exists
    ChartAlreadyExists,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Storage backend operation failed
    StorageError,

    /// Index could not be built
    IndexError,

    /// Server misconfiguration
    ConfigError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::InvalidChart => StatusCode::BAD_REQUEST,

            ErrorCode::RouteNotFound | ErrorCode::ObjectNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ChartAlreadyExists => StatusCode::CONFLICT,

            ErrorCode::InternalError
            | ErrorCode::StorageError
            | ErrorCode::IndexError
            | ErrorCode::ConfigError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidChart => "Invalid chart package",
            ErrorCode::RouteNotFound => "Route not found",
            ErrorCode::ObjectNotFound => "object not found",
            ErrorCode::ChartAlreadyExists => "Chart already exists",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::StorageError => "Storage operation failed",
            ErrorCode::IndexError => "Index could not be generated",
            ErrorCode::ConfigError => "Server misconfigured",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_chart(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidChart, message)
    }

    pub fn route_not_found() -> Self {
        Self::from_code(ErrorCode::RouteNotFound)
    }

    pub fn object_not_found() -> Self {
        Self::from_code(ErrorCode::ObjectNotFound)
    }

    pub fn chart_exists(name: &str, version: &str) -> Self {
        Self::new(
            ErrorCode::ChartAlreadyExists,
            format!("{name}-{version} already exists"),
        )
        .with_details(serde_json::json!({ "name": name, "version": version }))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IndexError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM CORE ERRORS
// ============================================================================

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } | StorageError::InvalidPath { .. } => {
                ApiError::object_not_found()
            }
            StorageError::Io { .. } => ApiError::storage_error(err.to_string()),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        ApiError::index_error(err.to_string())
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        ApiError::invalid_chart(err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::new(ErrorCode::ConfigError, err.to_string())
    }
}

impl From<ChartmillError> for ApiError {
    fn from(err: ChartmillError) -> Self {
        match err {
            ChartmillError::Storage(e) => e.into(),
            ChartmillError::Parse(e) => e.into(),
            ChartmillError::Index(e) => e.into(),
            ChartmillError::Config(e) => e.into(),
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
