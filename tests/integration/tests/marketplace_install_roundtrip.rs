//! End-to-end catalog scenarios over a mock marketplace and a real SQLite
//! store: feed discovery, install with checksum verification, multi-version
//! coexistence, uninstall, and the duplicate-operation guard.

use httpmock::prelude::*;
use lumen_catalog::{
    CatalogError, CatalogManager, InstallOutcome, MarketplaceClient, MarketplaceConfig,
    OperationState,
};
use lumen_package_store::{PackageStore, SqlitePackageStore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn feed_json(server: &MockServer) -> serde_json::Value {
    let viz_v1: &[u8] = b"viz panels v1";
    let viz_v2: &[u8] = b"viz panels v2";
    let maps_v1: &[u8] = b"map layers v1";
    serde_json::json!([
        {
            "id": "acme.viz",
            "name": "Viz Panels",
            "publisher": "acme",
            "description": "chart panels for Lumen",
            "keywords": ["charts", "plots"],
            "versions": {
                "1.0.0": {
                    "version": "1.0.0",
                    "publishedDate": "2026-01-05T00:00:00Z",
                    "artifactUrl": format!("{}/artifacts/viz-1.zip", server.base_url()),
                    "checksum": sha256_hex(viz_v1)
                },
                "2.0.0": {
                    "version": "2.0.0",
                    "publishedDate": "2026-03-01T00:00:00Z",
                    "artifactUrl": format!("{}/artifacts/viz-2.zip", server.base_url()),
                    "checksum": sha256_hex(viz_v2)
                }
            }
        },
        {
            "id": "acme.maps",
            "name": "Map Layers",
            "publisher": "acme",
            "description": "geographic layers",
            "keywords": ["geo"],
            "versions": {
                "1.0.0": {
                    "version": "1.0.0",
                    "artifactUrl": format!("{}/artifacts/maps-1.zip", server.base_url()),
                    "checksum": sha256_hex(maps_v1)
                }
            }
        }
    ])
}

fn mount_marketplace(server: &MockServer) {
    let feed = feed_json(server);
    server.mock(move |when, then| {
        when.method(GET).path("/feed");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(feed.clone());
    });
    server.mock(|when, then| {
        when.method(GET).path("/artifacts/viz-1.zip");
        then.status(200).body(b"viz panels v1");
    });
    server.mock(|when, then| {
        when.method(GET).path("/artifacts/viz-2.zip");
        then.status(200).body(b"viz panels v2");
    });
    server.mock(|when, then| {
        when.method(GET).path("/artifacts/maps-1.zip");
        then.status(200).body(b"map layers v1");
    });
}

fn manager_for(server: &MockServer, dir: &std::path::Path) -> (CatalogManager, Arc<SqlitePackageStore>) {
    let store = Arc::new(SqlitePackageStore::open(dir.join("catalog.db")).expect("open store"));
    let marketplace =
        MarketplaceClient::new(MarketplaceConfig::new(format!("{}/feed", server.base_url())))
            .expect("marketplace client");
    (CatalogManager::new(store.clone(), marketplace), store)
}

#[tokio::test]
async fn integration_fetch_search_install_and_query_round_trip() {
    let server = MockServer::start();
    mount_marketplace(&server);
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, store) = manager_for(&server, temp.path());

    let catalog = manager.fetch_catalog().await.expect("fetch catalog");
    assert_eq!(catalog.len(), 2);

    let hits = manager.search("charts");
    assert_eq!(hits.len(), 1);
    let descriptor = &hits[0];
    assert_eq!(descriptor.base_id, "acme.viz");

    let outcome = manager.install(descriptor, "1.0.0").await.expect("install");
    assert!(matches!(outcome, InstallOutcome::Installed(_)));

    let stored = store
        .get("acme.viz@1.0.0")
        .await
        .expect("get")
        .expect("package persisted");
    assert_eq!(stored.record.base_id, "acme.viz");
    assert_eq!(stored.content, b"viz panels v1");
    let origin = store
        .get_origin("acme.viz@1.0.0")
        .await
        .expect("get origin")
        .expect("origin persisted");
    assert_eq!(origin.marketplace_id, "acme.viz");
    assert_eq!(origin.version, "1.0.0");
}

#[tokio::test]
async fn integration_two_versions_coexist_and_uninstall_is_selective() {
    let server = MockServer::start();
    mount_marketplace(&server);
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, store) = manager_for(&server, temp.path());

    let catalog = manager.fetch_catalog().await.expect("fetch catalog");
    let descriptor = catalog
        .iter()
        .find(|descriptor| descriptor.base_id == "acme.viz")
        .expect("descriptor");

    manager.install(descriptor, "1.0.0").await.expect("install 1.0.0");
    manager.install(descriptor, "2.0.0").await.expect("install 2.0.0");

    let versions = manager
        .list_installed(Some("acme.viz"))
        .await
        .expect("list versions");
    assert_eq!(
        versions
            .iter()
            .map(|record| record.versioned_id.as_str())
            .collect::<Vec<_>>(),
        vec!["acme.viz@1.0.0", "acme.viz@2.0.0"]
    );

    manager.uninstall("acme.viz@1.0.0").await.expect("uninstall");
    let remaining = manager
        .list_installed(Some("acme.viz"))
        .await
        .expect("list versions");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].versioned_id, "acme.viz@2.0.0");
    assert!(store
        .get_origin("acme.viz@1.0.0")
        .await
        .expect("get origin")
        .is_none());
    assert!(store
        .get_origin("acme.viz@2.0.0")
        .await
        .expect("get origin")
        .is_some());
}

#[tokio::test]
async fn integration_corrupted_artifact_never_reaches_the_store() {
    let server = MockServer::start();
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, store) = manager_for(&server, temp.path());

    // Feed advertises the checksum of the genuine payload, but the server
    // hands back different bytes.
    server.mock(|when, then| {
        when.method(GET).path("/feed");
        then.status(200).json_body(serde_json::json!([
            {
                "id": "acme.viz",
                "name": "Viz Panels",
                "publisher": "acme",
                "versions": {
                    "1.0.0": {
                        "version": "1.0.0",
                        "artifactUrl": format!("{}/artifacts/viz-1.zip", server.base_url()),
                        "checksum": sha256_hex(b"genuine payload")
                    }
                }
            }
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/artifacts/viz-1.zip");
        then.status(200).body(b"corrupted payload");
    });

    let catalog = manager.fetch_catalog().await.expect("fetch catalog");
    let error = manager
        .install(&catalog[0], "1.0.0")
        .await
        .expect_err("install must fail");
    assert!(matches!(error, CatalogError::IntegrityViolation { .. }));
    assert!(store
        .get("acme.viz@1.0.0")
        .await
        .expect("get")
        .is_none());
    assert_eq!(manager.operation_state("acme.viz@1.0.0"), OperationState::Idle);
}

#[tokio::test]
async fn integration_concurrent_duplicate_installs_write_exactly_one_record() {
    let server = MockServer::start();
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _store) = manager_for(&server, temp.path());

    let body: &[u8] = b"slow artifact";
    server.mock(|when, then| {
        when.method(GET).path("/feed");
        then.status(200).json_body(serde_json::json!([
            {
                "id": "acme.viz",
                "name": "Viz Panels",
                "publisher": "acme",
                "versions": {
                    "1.0.0": {
                        "version": "1.0.0",
                        "artifactUrl": format!("{}/artifacts/slow.zip", server.base_url()),
                        "checksum": sha256_hex(body)
                    }
                }
            }
        ]));
    });
    server.mock(move |when, then| {
        when.method(GET).path("/artifacts/slow.zip");
        then.status(200).delay(Duration::from_millis(250)).body(body);
    });

    let catalog = manager.fetch_catalog().await.expect("fetch catalog");
    let descriptor = catalog[0].clone();
    let manager = Arc::new(manager);

    let first = tokio::spawn({
        let manager = manager.clone();
        let descriptor = descriptor.clone();
        async move { manager.install(&descriptor, "1.0.0").await }
    });
    let second = tokio::spawn({
        let manager = manager.clone();
        let descriptor = descriptor.clone();
        async move { manager.install(&descriptor, "1.0.0").await }
    });

    let results = vec![
        first.await.expect("first task"),
        second.await.expect("second task"),
    ];
    let installed = results
        .iter()
        .filter(|result| matches!(result, Ok(InstallOutcome::Installed(_))))
        .count();
    assert_eq!(installed, 1, "exactly one caller performs the install");
    for result in &results {
        match result {
            Ok(InstallOutcome::Installed(_)) => {}
            Ok(InstallOutcome::AlreadyInstalled(id)) => assert_eq!(id, "acme.viz@1.0.0"),
            Err(CatalogError::OperationInProgress(id)) => assert_eq!(id, "acme.viz@1.0.0"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
    assert_eq!(
        manager.list_installed(None).await.expect("list").len(),
        1,
        "one record regardless of which caller lost the race"
    );
}
