//! Welcome page and health check.
//!
//! No authentication required for these endpoints.

use axum::{
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::constants::{HTML_CONTENT_TYPE, WELCOME_PAGE};

/// Health check response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
}

/// `GET /`
pub async fn welcome() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, HTML_CONTENT_TYPE)], WELCOME_PAGE)
}

/// `GET /health`
///
/// Liveness only. Storage is not probed so a slow backend cannot fail the
/// check.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { healthy: true })
}
