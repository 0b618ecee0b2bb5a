//! Chart package download, upload and deletion.

use axum::{
    body::Bytes,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chartmill_core::{ChartRef, StorageError};
use serde::{Deserialize, Serialize};

use super::RouteContext;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedResponse {
    pub saved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// `GET <repo>/charts/:filename`
pub async fn get_chart_object(state: &AppState, ctx: &RouteContext) -> ApiResult<Response> {
    let filename = ctx.param("filename")?;
    if filename.contains('/') {
        return Err(ApiError::object_not_found());
    }

    let path = ctx.tenant.object_path(filename);
    match state.storage.get_object(&path).await {
        Ok(object) => Ok((
            [(header::CONTENT_TYPE, object.content_type)],
            object.content,
        )
            .into_response()),
        Err(e @ (StorageError::NotFound { .. } | StorageError::InvalidPath { .. })) => {
            tracing::warn!(tenant = %ctx.tenant, filename, error = %e, "Chart object not found");
            Err(ApiError::object_not_found())
        }
        Err(e) => {
            tracing::error!(tenant = %ctx.tenant, filename, error = %e, "Failed to fetch chart object");
            Err(e.into())
        }
    }
}

/// `POST <repo>/api/charts`
///
/// The body is a packaged chart. It is stored as `<name>-<version>.tgz`
/// under the tenant and the tenant's index is refreshed before replying.
pub async fn upload_chart(state: &AppState, ctx: &RouteContext, body: Bytes) -> ApiResult<Response> {
    if body.is_empty() {
        return Err(ApiError::invalid_chart("request body is empty"));
    }

    let metadata = state
        .parser
        .parse_metadata(&body)
        .map_err(|e| ApiError::invalid_chart(e.to_string()))?;
    let chart = metadata.chart_ref();
    let path = ctx.tenant.object_path(&chart.package_filename());

    if !state.config.allow_overwrite && state.storage.exists(&path).await? {
        return Err(ApiError::chart_exists(&chart.name, &chart.version));
    }

    state.storage.put_object(&path, &body).await?;
    tracing::info!(
        tenant = %ctx.tenant,
        chart = %chart.name,
        version = %chart.version,
        "Chart package stored"
    );

    refresh_after_write(state, ctx).await;
    Ok((StatusCode::CREATED, Json(SavedResponse { saved: true })).into_response())
}

/// `DELETE <repo>/api/charts/:name/:version`
pub async fn delete_chart(state: &AppState, ctx: &RouteContext) -> ApiResult<Response> {
    let chart = ChartRef::new(ctx.param("name")?, ctx.param("version")?);
    let path = ctx.tenant.object_path(&chart.package_filename());

    state.storage.delete_object(&path).await?;
    tracing::info!(
        tenant = %ctx.tenant,
        chart = %chart.name,
        version = %chart.version,
        "Chart package deleted"
    );

    refresh_after_write(state, ctx).await;
    Ok(Json(DeletedResponse { deleted: true }).into_response())
}

/// The write already succeeded, so a failed refresh is only logged. The
/// next read or timer tick picks the change up.
async fn refresh_after_write(state: &AppState, ctx: &RouteContext) {
    match state.cache.refresh(&ctx.tenant).await {
        Ok(outcome) => tracing::debug!(
            tenant = %ctx.tenant,
            changed = outcome.changed,
            versions = outcome.index.version_count(),
            "Index refreshed after write"
        ),
        Err(e) => tracing::warn!(
            tenant = %ctx.tenant,
            error = %e,
            "Index refresh after write failed"
        ),
    }
}
