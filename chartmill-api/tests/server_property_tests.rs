//! Property-Based Tests for Hierarchical Routing
//!
//! For any tenant path of depth N, a server configured with static depth N
//! and a server with dynamic depth both serve the tenant's index and chart
//! files, and both reject the same path at the wrong static depth.

mod support;

use std::sync::Arc;

use axum::http::StatusCode;
use chartmill_core::ServerConfig;
use chartmill_storage::InMemoryBackend;
use chartmill_test_utils::fixtures::{chart_package, package_name, ts};
use chartmill_test_utils::generators::arb_tenant_segments;
use proptest::prelude::*;
use support::*;

fn seeded_store(tenant: &str) -> Arc<InMemoryBackend> {
    let store = Arc::new(InMemoryBackend::new());
    let path = if tenant.is_empty() {
        package_name("demo", "0.1.0")
    } else {
        format!("{tenant}/{}", package_name("demo", "0.1.0"))
    };
    store
        .put_object_at(&path, &chart_package("demo", "0.1.0"), ts(0))
        .unwrap();
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_static_and_dynamic_depth_serve_same_tenant(
        segments in (0usize..4).prop_flat_map(arb_tenant_segments)
    ) {
        let tenant = segments.join("/");
        let depth = segments.len();
        let prefix = if tenant.is_empty() { String::new() } else { format!("/{tenant}") };

        tokio_test::block_on(async {
            for dynamic in [false, true] {
                let config = ServerConfig::default()
                    .with_depth(depth)
                    .with_dynamic_depth(dynamic);
                let app = app(config, seeded_store(&tenant));

                let index = get_index(&app, &format!("{prefix}/index.yaml")).await;
                assert_eq!(index.version_count(), 1);
                assert!(index.get("demo", "0.1.0").is_some());

                let download = get(&app, &format!("{prefix}/charts/demo-0.1.0.tgz")).await;
                assert_eq!(download.status(), StatusCode::OK);
            }

            let wrong_depth = ServerConfig::default().with_depth(depth + 1);
            let app = app(wrong_depth, seeded_store(&tenant));
            let response = get(&app, &format!("{prefix}/index.yaml")).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        });
    }
}
