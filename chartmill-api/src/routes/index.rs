//! `GET <repo>/index.yaml`

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

use super::RouteContext;
use crate::constants::INDEX_CONTENT_TYPE;
use crate::error::ApiResult;
use crate::state::AppState;

/// Serve the tenant's repository index, building it on first use.
pub async fn get_index(state: &AppState, ctx: &RouteContext) -> ApiResult<Response> {
    let index = state.cache.get_index(&ctx.tenant).await.map_err(|e| {
        tracing::error!(tenant = %ctx.tenant, error = %e, "Failed to serve index");
        e
    })?;
    let body = index.to_yaml()?;
    Ok(([(header::CONTENT_TYPE, INDEX_CONTENT_TYPE)], body).into_response())
}
