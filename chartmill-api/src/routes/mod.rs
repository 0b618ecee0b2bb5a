//! HTTP routes.
//!
//! Tenant paths have a configurable number of segments, which axum's own
//! router cannot express, so every request except `/metrics` lands in
//! [`dispatch`]. It resolves the request against the hierarchical
//! [`RouteTable`], decodes the tenant and parameters, and calls the
//! endpoint handler.

pub mod charts;
pub mod health;
pub mod index;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{Method, Uri},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chartmill_core::TenantKey;
use tower_http::limit::RequestBodyLimitLayer;

use crate::constants::MAX_UPLOAD_BYTES;
use crate::error::{ApiError, ApiResult};
use crate::router::{Capability, RouteMatch, RouteTable, TenantDepth, TENANT_PARAM};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware, RequestLogSettings, RouteLabel};

// ============================================================================
// ENDPOINTS
// ============================================================================

/// Endpoints served through the hierarchical router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Welcome,
    Health,
    IndexFile,
    ChartObject,
    UploadChart,
    DeleteChart,
}

impl Endpoint {
    /// Metrics and log label.
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::Welcome => "welcome",
            Endpoint::Health => "health",
            Endpoint::IndexFile => "index",
            Endpoint::ChartObject => "chart_object",
            Endpoint::UploadChart => "upload_chart",
            Endpoint::DeleteChart => "delete_chart",
        }
    }
}

/// Route registrations. Order matters: earlier routes win.
pub fn route_table() -> RouteTable<Endpoint> {
    RouteTable::new()
        .route(Method::GET, "/", Endpoint::Welcome, None)
        .route(Method::GET, "/health", Endpoint::Health, None)
        .route(
            Method::GET,
            "/:repo/index.yaml",
            Endpoint::IndexFile,
            Some(Capability::Pull),
        )
        .route(
            Method::GET,
            "/:repo/charts/:filename",
            Endpoint::ChartObject,
            Some(Capability::Pull),
        )
        .route(
            Method::POST,
            "/:repo/api/charts",
            Endpoint::UploadChart,
            Some(Capability::Push),
        )
        .route(
            Method::DELETE,
            "/:repo/api/charts/:name/:version",
            Endpoint::DeleteChart,
            Some(Capability::Push),
        )
}

// ============================================================================
// REQUEST CONTEXT
// ============================================================================

/// A matched request with its tenant and parameters decoded.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub endpoint: Endpoint,
    pub tenant: TenantKey,
    params: Vec<(String, String)>,
}

impl RouteContext {
    fn from_match(matched: RouteMatch<'_, Endpoint>) -> ApiResult<Self> {
        let mut tenant = TenantKey::root();
        let mut params = Vec::with_capacity(matched.params.len());
        for (name, raw) in matched.params {
            if name == TENANT_PARAM {
                tenant = decode_tenant(&raw)?;
            } else {
                let value = decode_param(&name, &raw)?;
                params.push((name, value));
            }
        }

        Ok(Self {
            endpoint: *matched.route.handler(),
            tenant,
            params,
        })
    }

    /// A parameter the route pattern guarantees.
    pub fn param(&self, name: &str) -> ApiResult<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| ApiError::internal_error(format!("route is missing parameter '{name}'")))
    }
}

fn decode_param(name: &str, raw: &str) -> ApiResult<String> {
    urlencoding::decode(raw)
        .map(|v| v.into_owned())
        .map_err(|_| ApiError::invalid_input(format!("parameter '{name}' is not valid UTF-8")))
}

/// Decode the tenant path one segment at a time so the key keeps the depth
/// the router matched. A segment that decodes to contain `/` is rejected.
fn decode_tenant(raw: &str) -> ApiResult<TenantKey> {
    if raw.is_empty() {
        return Ok(TenantKey::root());
    }
    let segments = raw
        .split('/')
        .map(|segment| decode_param(TENANT_PARAM, segment))
        .collect::<ApiResult<Vec<String>>>()?;
    TenantKey::from_segments(segments.iter().map(String::as_str))
        .map_err(|_| ApiError::route_not_found())
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Fallback handler that drives the hierarchical router.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let depth = TenantDepth::new(state.config.depth, state.config.depth_dynamic);
    let matched = state
        .routes
        .matches(&method, uri.path(), &state.config.context_path, depth);

    let Some(matched) = matched else {
        return ApiError::route_not_found().into_response();
    };

    let label = matched.route.handler().label();
    let mut response = match RouteContext::from_match(matched) {
        Ok(ctx) => handle(&state, ctx, body).await,
        Err(e) => e.into_response(),
    };
    response.extensions_mut().insert(RouteLabel(label));
    response
}

async fn handle(state: &AppState, ctx: RouteContext, body: Bytes) -> Response {
    let result = match ctx.endpoint {
        Endpoint::Welcome => Ok(health::welcome().await.into_response()),
        Endpoint::Health => Ok(health::health().await.into_response()),
        Endpoint::IndexFile => index::get_index(state, &ctx).await,
        Endpoint::ChartObject => charts::get_chart_object(state, &ctx).await,
        Endpoint::UploadChart => charts::upload_chart(state, &ctx, body).await,
        Endpoint::DeleteChart => charts::delete_chart(state, &ctx).await,
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the complete application router.
pub fn create_router(state: AppState) -> Router {
    let log_settings = RequestLogSettings {
        log_health: state.config.log_health,
    };

    let mut router = Router::new();
    if !state.config.disable_metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .fallback(dispatch)
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(from_fn_with_state(log_settings, observability_middleware))
}
