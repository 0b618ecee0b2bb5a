//! HTTP surface tests: routing across tenant depths, content types, errors
//! and request ids.

mod support;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use chartmill_api::telemetry::REQUEST_ID_HEADER;
use chartmill_core::ServerConfig;
use chartmill_storage::{InMemoryBackend, StorageBackend};
use chartmill_test_utils::fixtures::{chart_package, package_name, ts};
use support::*;

fn memory() -> Arc<InMemoryBackend> {
    Arc::new(InMemoryBackend::new())
}

// ============================================================================
// ROUTING
// ============================================================================

#[tokio::test]
async fn test_routes_across_depths_and_context_paths() {
    let repos = ["", "myrepo", "myorg/myrepo", "myorg/myteam/myrepo"];
    let context_paths = ["", "/x", "/x/y"];

    for (depth, repo) in repos.iter().enumerate() {
        for context_path in context_paths {
            for dynamic in [false, true] {
                let config = ServerConfig::default()
                    .with_depth(depth)
                    .with_dynamic_depth(dynamic)
                    .with_context_path(context_path);
                let app = app(config, memory());
                let repo_prefix = if repo.is_empty() {
                    String::new()
                } else {
                    format!("/{repo}")
                };

                let welcome = get(&app, &format!("{context_path}/")).await;
                assert_eq!(welcome.status(), StatusCode::OK, "welcome depth={depth} ctx={context_path}");

                let health = get(&app, &format!("{context_path}/health")).await;
                assert_eq!(health.status(), StatusCode::OK);
                assert_eq!(body_json(health).await, serde_json::json!({ "healthy": true }));

                let uri = format!("{context_path}{repo_prefix}/index.yaml");
                let index = get(&app, &uri).await;
                assert_eq!(index.status(), StatusCode::OK, "GET {uri} dynamic={dynamic}");
                assert_eq!(
                    index.headers().get(header::CONTENT_TYPE).unwrap(),
                    "application/x-yaml"
                );
            }
        }
    }
}

#[tokio::test]
async fn test_unmatched_route_is_404() {
    let app = app(ServerConfig::default().with_depth(1), memory());

    for uri in ["/index.yaml", "/a/b/index.yaml", "/a/unknown", "/outside"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        let body = body_json(response).await;
        assert_eq!(body["code"], "ROUTE_NOT_FOUND");
    }
}

#[tokio::test]
async fn test_context_path_required_when_configured() {
    let app = app(ServerConfig::default().with_context_path("/charts-api"), memory());
    assert_eq!(get(&app, "/health").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/charts-api/health").await.status(), StatusCode::OK);
    assert_eq!(get(&app, "/charts-api").await.status(), StatusCode::OK);
}

// ============================================================================
// INDEX AND DOWNLOADS
// ============================================================================

#[tokio::test]
async fn test_index_lists_tenant_charts_only() {
    let store = memory();
    store
        .put_object_at("team/web-1.0.0.tgz", &chart_package("web", "1.0.0"), ts(0))
        .unwrap();
    store
        .put_object_at("team/nested/db-1.0.0.tgz", &chart_package("db", "1.0.0"), ts(0))
        .unwrap();
    store.put_object_at("team/README.md", b"docs", ts(0)).unwrap();

    let app = app(ServerConfig::default().with_depth(1), store);
    let index = get_index(&app, "/team/index.yaml").await;

    assert_eq!(index.version_count(), 1);
    let web = index.get("web", "1.0.0").unwrap();
    assert_eq!(web.urls, vec!["charts/web-1.0.0.tgz".to_string()]);
    assert_eq!(web.created, ts(0));
    assert_eq!(web.digest.len(), 64);
}

#[tokio::test]
async fn test_index_urls_use_chart_url() {
    let store = memory();
    store
        .put_object_at("org/repo/web-1.0.0.tgz", &chart_package("web", "1.0.0"), ts(0))
        .unwrap();

    let config = ServerConfig::default()
        .with_depth(2)
        .with_context_path("/helm")
        .with_chart_url("https://charts.example.com/");
    let app = app(config, store);
    let index = get_index(&app, "/helm/org/repo/index.yaml").await;

    assert_eq!(
        index.get("web", "1.0.0").unwrap().urls,
        vec!["https://charts.example.com/helm/org/repo/charts/web-1.0.0.tgz".to_string()]
    );
}

#[tokio::test]
async fn test_chart_download_and_content_types() {
    let store = memory();
    let package = chart_package("web", "1.0.0");
    store
        .put_object_at(&format!("team/{}", package_name("web", "1.0.0")), &package, ts(0))
        .unwrap();
    store
        .put_object_at("team/web-1.0.0.tgz.prov", b"-----BEGIN PGP SIGNED MESSAGE-----", ts(0))
        .unwrap();

    let app = app(ServerConfig::default().with_depth(1), store);

    let response = get(&app, "/team/charts/web-1.0.0.tgz").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-tar"
    );
    assert_eq!(body_bytes(response).await, package);

    let prov = get(&app, "/team/charts/web-1.0.0.tgz.prov").await;
    assert_eq!(prov.status(), StatusCode::OK);
    assert_eq!(
        prov.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pgp-signature"
    );
}

#[tokio::test]
async fn test_missing_chart_is_404() {
    let app = app(ServerConfig::default().with_depth(1), memory());
    let response = get(&app, "/team/charts/nope-0.0.1.tgz").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["code"], "OBJECT_NOT_FOUND");
    assert_eq!(body["message"], "object not found");
}

// ============================================================================
// WRITE ENDPOINTS
// ============================================================================

#[tokio::test]
async fn test_upload_conflict_and_delete() {
    let store = memory();
    let app = app(ServerConfig::default().with_depth(1), store.clone());
    let package = chart_package("api", "2.1.0");

    let created = request(&app, Method::POST, "/team/api/charts", package.clone()).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(body_json(created).await, serde_json::json!({ "saved": true }));
    assert!(store.exists("team/api-2.1.0.tgz").await.unwrap());

    let index = get_index(&app, "/team/index.yaml").await;
    assert!(index.get("api", "2.1.0").is_some());

    let conflict = request(&app, Method::POST, "/team/api/charts", package).await;
    assert_eq!(conflict.status(), StatusCode::CONFLICT);
    let body = body_json(conflict).await;
    assert_eq!(body["code"], "CHART_ALREADY_EXISTS");
    assert_eq!(body["details"], serde_json::json!({ "name": "api", "version": "2.1.0" }));

    let deleted = request(&app, Method::DELETE, "/team/api/charts/api/2.1.0", Vec::new()).await;
    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(body_json(deleted).await, serde_json::json!({ "deleted": true }));

    let index = get_index(&app, "/team/index.yaml").await;
    assert!(index.is_empty());

    let missing = request(&app, Method::DELETE, "/team/api/charts/api/2.1.0", Vec::new()).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_overwrite_allowed() {
    let store = memory();
    let config = ServerConfig::default().with_allow_overwrite(true);
    let app = app(config, store);
    let package = chart_package("api", "2.1.0");

    for _ in 0..2 {
        let response = request(&app, Method::POST, "/api/charts", package.clone()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_upload_rejects_invalid_package() {
    let app = app(ServerConfig::default(), memory());

    let empty = request(&app, Method::POST, "/api/charts", Vec::new()).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let garbage = request(&app, Method::POST, "/api/charts", b"not a chart".to_vec()).await;
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(garbage).await["code"], "INVALID_CHART");
}

// ============================================================================
// OBSERVABILITY
// ============================================================================

#[tokio::test]
async fn test_request_id_echoed_or_generated() {
    let app = app(ServerConfig::default(), memory());

    let request = Request::builder()
        .uri("/health")
        .header(REQUEST_ID_HEADER, "req-123")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-123");

    let response = get(&app, "/health").await;
    let generated = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}

#[tokio::test]
async fn test_metrics_endpoint_toggle() {
    let enabled = app(ServerConfig::default(), memory());
    let _ = get(&enabled, "/health").await;
    let response = get(&enabled, "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("chartmill_http_requests_total"));

    let mut config = ServerConfig::default();
    config.disable_metrics = true;
    let disabled = app(config, memory());
    assert_eq!(get(&disabled, "/metrics").await.status(), StatusCode::NOT_FOUND);
}
