//! End-to-end tests against a filesystem-backed server.

mod support;

use std::sync::Arc;

use axum::http::{header, Method, StatusCode};
use chartmill_api::{create_router, AppState};
use chartmill_core::{ServerConfig, TenantKey, STATEFILE_NAME};
use chartmill_storage::{LocalFilesystemBackend, TarballChartParser};
use chartmill_test_utils::fixtures::{chart_package, package_name};
use support::*;
use tempfile::TempDir;

fn local_app(dir: &TempDir, config: ServerConfig) -> axum::Router {
    app(
        config.with_local_storage(dir.path()),
        Arc::new(LocalFilesystemBackend::new(dir.path())),
    )
}

fn write_package(dir: &TempDir, tenant: &str, name: &str, version: &str) {
    let tenant_dir = dir.path().join(tenant);
    std::fs::create_dir_all(&tenant_dir).unwrap();
    std::fs::write(
        tenant_dir.join(package_name(name, version)),
        chart_package(name, version),
    )
    .unwrap();
}

#[tokio::test]
async fn test_empty_tenant_serves_empty_index() {
    let dir = TempDir::new().unwrap();
    let app = local_app(&dir, ServerConfig::default().with_depth(2));

    let response = get(&app, "/org/repo/index.yaml").await;
    assert_eq!(response.status(), StatusCode::OK);
    let raw = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(raw.contains("apiVersion: v1"));
    assert!(raw.contains("entries: {}"));
}

#[tokio::test]
async fn test_empty_tenant_sees_new_package_on_next_read() {
    let dir = TempDir::new().unwrap();
    let app = local_app(&dir, ServerConfig::default().with_depth(1));

    assert!(get_index(&app, "/team/index.yaml").await.is_empty());

    write_package(&dir, "team", "web", "1.0.0");
    let index = get_index(&app, "/team/index.yaml").await;
    assert_eq!(index.version_count(), 1);
    assert!(index.get("web", "1.0.0").is_some());
}

#[tokio::test]
async fn test_dynamic_depth_serves_tenants_of_any_depth() {
    let dir = TempDir::new().unwrap();
    write_package(&dir, "a", "one", "0.1.0");
    write_package(&dir, "a/b", "two", "0.2.0");
    write_package(&dir, "a/b/c", "three", "0.3.0");

    let app = local_app(&dir, ServerConfig::default().with_dynamic_depth(true));

    for (uri, name, version) in [
        ("/a/index.yaml", "one", "0.1.0"),
        ("/a/b/index.yaml", "two", "0.2.0"),
        ("/a/b/c/index.yaml", "three", "0.3.0"),
    ] {
        let index = get_index(&app, uri).await;
        assert_eq!(index.version_count(), 1, "{uri}");
        assert!(index.get(name, version).is_some(), "{uri}");
    }

    let download = get(&app, "/a/b/charts/two-0.2.0.tgz").await;
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(body_bytes(download).await, chart_package("two", "0.2.0"));
}

#[tokio::test]
async fn test_upload_download_delete_roundtrip() {
    let dir = TempDir::new().unwrap();
    let app = local_app(&dir, ServerConfig::default().with_depth(1));
    let package = chart_package("api", "1.2.3");

    let created = request(&app, Method::POST, "/team/api/charts", package.clone()).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    assert!(dir.path().join("team/api-1.2.3.tgz").is_file());

    let index = get_index(&app, "/team/index.yaml").await;
    let record = index.get("api", "1.2.3").unwrap();
    assert_eq!(record.urls, vec!["charts/api-1.2.3.tgz".to_string()]);

    let download = get(&app, "/team/charts/api-1.2.3.tgz").await;
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(
        download.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-tar"
    );
    assert_eq!(body_bytes(download).await, package);

    let deleted = request(&app, Method::DELETE, "/team/api/charts/api/1.2.3", Vec::new()).await;
    assert_eq!(deleted.status(), StatusCode::OK);
    assert!(!dir.path().join("team/api-1.2.3.tgz").exists());
    assert!(get_index(&app, "/team/index.yaml").await.is_empty());
    assert_eq!(
        get(&app, "/team/charts/api-1.2.3.tgz").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_statefile_persisted_next_to_packages() {
    let dir = TempDir::new().unwrap();
    write_package(&dir, "team", "web", "1.0.0");

    let config = ServerConfig::default()
        .with_depth(1)
        .with_local_storage(dir.path());
    let state = AppState::new(
        config,
        Arc::new(LocalFilesystemBackend::new(dir.path())),
        Arc::new(TarballChartParser::new()),
    );
    let cache = state.cache.clone();
    let app = create_router(state);

    let index = get_index(&app, "/team/index.yaml").await;
    assert_eq!(index.version_count(), 1);

    let statefile = dir.path().join("team").join(STATEFILE_NAME);
    let raw = std::fs::read_to_string(statefile).unwrap();
    assert!(raw.contains("web"));

    // The statefile is not a chart package, so listing it changes nothing.
    let outcome = cache.refresh(&TenantKey::parse("team").unwrap()).await.unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.index.version_count(), 1);
}
