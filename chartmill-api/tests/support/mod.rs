//! Shared helpers for chartmill-api integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, Response, StatusCode},
    Router,
};
use chartmill_api::{create_router, AppState};
use chartmill_core::{IndexFile, ServerConfig};
use chartmill_storage::{StorageBackend, TarballChartParser};
use tower::ServiceExt;

/// Largest response body the helpers will read.
const MAX_BODY: usize = 16 * 1024 * 1024;

/// Router over `storage` with statefiles off so listings are the only reads.
pub fn app(config: ServerConfig, storage: Arc<dyn StorageBackend>) -> Router {
    let state = AppState::new(
        config.with_statefiles(false),
        storage,
        Arc::new(TarballChartParser::new()),
    );
    create_router(state)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone()
        .oneshot(request)
        .await
        .expect("router is infallible")
}

pub async fn request(app: &Router, method: Method, uri: &str, body: Vec<u8>) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .expect("valid request");
    send(app, request).await
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    request(app, Method::GET, uri, Vec::new()).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), MAX_BODY)
        .await
        .expect("read body")
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

/// GET an index and parse it, asserting success.
pub async fn get_index(app: &Router, uri: &str) -> IndexFile {
    let response = get(app, uri).await;
    assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
    let raw = String::from_utf8(body_bytes(response).await).expect("utf-8 index");
    IndexFile::from_yaml(&raw).expect("valid index yaml")
}
