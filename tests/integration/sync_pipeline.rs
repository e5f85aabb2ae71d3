//! Integration tests for the inventory sync engine
//!
//! These tests drive full discovery passes against an in-process registry
//! and verify the HTTP traffic the sync engine produces against a mock
//! inventory store:
//! - first discovery → one import batch
//! - unchanged discovery → zero calls
//! - removal → one ids-only delete, no import, untouched persisted times

use inventory_monitoring::inventory::ResourceManager;
use inventory_monitoring::sync::{InventorySync, SyncSettings};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{name, pool_registry, pool_service};

async fn mock_store() -> MockServer {
    let store = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/import"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&store)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&store)
        .await;
    store
}

async fn count_requests(store: &MockServer, http_method: &str) -> usize {
    store
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.method.to_string().eq_ignore_ascii_case(http_method))
        .count()
}

#[tokio::test]
async fn test_first_discovery_imports_once_then_nothing() {
    let registry = pool_registry();
    let service = pool_service(registry.clone());
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();
    let store = mock_store().await;
    let mut sync = InventorySync::new(SyncSettings::new(store.uri()));

    // first pass: everything is new, one batched import
    let outcome = service.discover_all(&session, &mut manager).await;
    let report = sync.sync_discovery(&mut manager, service.types(), &outcome).await.unwrap();
    assert_eq!(report.imported, 3);
    assert_eq!(report.deleted, 0);
    assert_eq!(count_requests(&store, "POST").await, 1);
    assert_eq!(count_requests(&store, "DELETE").await, 0);

    // every imported resource is now marked persisted
    for resource in manager.resources_breadth_first() {
        assert!(resource.persisted_time.is_some());
    }

    // second pass with no changes: zero HTTP calls
    let outcome = service.discover_all(&session, &mut manager).await;
    assert!(outcome.is_noop());
    let report = sync.sync_discovery(&mut manager, service.types(), &outcome).await.unwrap();
    assert_eq!(report, Default::default());
    assert_eq!(count_requests(&store, "POST").await, 1);
    assert_eq!(count_requests(&store, "DELETE").await, 0);
}

#[tokio::test]
async fn test_removal_deletes_by_id_and_keeps_sibling_untouched() {
    let registry = pool_registry();
    let service = pool_service(registry.clone());
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();
    let store = mock_store().await;
    let mut sync = InventorySync::new(SyncSettings::new(store.uri()));

    let outcome = service.discover_all(&session, &mut manager).await;
    sync.sync_discovery(&mut manager, service.types(), &outcome).await.unwrap();

    let sibling_id = "test~app:name=jobs,type=Pool".into();
    let persisted_before = manager.get_resource(&sibling_id).unwrap().persisted_time;

    // the web pool disappears from the endpoint
    registry.unregister(&name("app:type=Pool,name=web"));
    let outcome = service.discover_all(&session, &mut manager).await;
    let report = sync.sync_discovery(&mut manager, service.types(), &outcome).await.unwrap();

    assert_eq!(report.imported, 0);
    assert_eq!(report.deleted, 1);
    assert_eq!(count_requests(&store, "POST").await, 1);
    assert_eq!(count_requests(&store, "DELETE").await, 1);

    let deletes: Vec<_> = store
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.to_string().eq_ignore_ascii_case("DELETE"))
        .collect();
    assert_eq!(deletes[0].url.path(), "/resources");
    let query = deletes[0].url.query().unwrap();
    assert!(query.contains("ids="));
    assert!(query.contains("web"));
    assert!(!query.contains("jobs"));

    // the surviving pool was not re-sent and keeps its persisted time
    let persisted_after = manager.get_resource(&sibling_id).unwrap().persisted_time;
    assert_eq!(persisted_after, persisted_before);
}

#[tokio::test]
async fn test_modified_resource_reimports_its_subtree_only() {
    let registry = pool_registry();
    let service = pool_service(registry.clone());
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();
    let store = mock_store().await;
    let mut sync = InventorySync::new(SyncSettings::new(store.uri()));

    let outcome = service.discover_all(&session, &mut manager).await;
    sync.sync_discovery(&mut manager, service.types(), &outcome).await.unwrap();

    registry.set_attribute(&name("app:type=Pool,name=jobs"), "size", serde_json::json!(16));
    let outcome = service.discover_all(&session, &mut manager).await;
    let report = sync.sync_discovery(&mut manager, service.types(), &outcome).await.unwrap();

    // only the changed pool goes out again; parent and sibling are untouched
    assert_eq!(report.imported, 1);
    assert_eq!(count_requests(&store, "POST").await, 2);

    let imports: Vec<_> = store
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.to_string().eq_ignore_ascii_case("POST"))
        .collect();
    let body: serde_json::Value = serde_json::from_slice(&imports[1].body).unwrap();
    let resources = body["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0]["id"], "test~app:name=jobs,type=Pool");
    // types ride along only on their first import
    assert!(body["types"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_import_payload_carries_types_once() {
    let registry = pool_registry();
    let service = pool_service(registry);
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();
    let store = mock_store().await;
    let mut sync = InventorySync::new(SyncSettings::new(store.uri()));

    let outcome = service.discover_all(&session, &mut manager).await;
    sync.sync_discovery(&mut manager, service.types(), &outcome).await.unwrap();

    let imports: Vec<_> = store
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.to_string().eq_ignore_ascii_case("POST"))
        .collect();
    let body: serde_json::Value = serde_json::from_slice(&imports[0].body).unwrap();
    let types: Vec<_> = body["types"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(types, vec!["Server", "Pool"]);
}

#[tokio::test]
async fn test_rejected_import_surfaces_and_nothing_is_marked_persisted() {
    let registry = pool_registry();
    let service = pool_service(registry);
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();

    let store = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/import"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&store)
        .await;
    let mut sync = InventorySync::new(SyncSettings::new(store.uri()));

    let outcome = service.discover_all(&session, &mut manager).await;
    let result = sync.sync_discovery(&mut manager, service.types(), &outcome).await;
    assert!(result.is_err());

    // no persisted-time bump without a confirmed write
    for resource in manager.resources_breadth_first() {
        assert!(resource.persisted_time.is_none());
    }
}

#[tokio::test]
async fn test_incremental_removed_event_issues_single_delete() {
    let store = mock_store().await;
    let mut sync = InventorySync::new(SyncSettings::new(store.uri()));

    let report = sync
        .sync_removed(&["srv~/a=1".into(), "srv~/a=2".into()])
        .await
        .unwrap();
    assert_eq!(report.deleted, 2);
    assert_eq!(count_requests(&store, "DELETE").await, 1);

    let deletes: Vec<_> = store
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.to_string().eq_ignore_ascii_case("DELETE"))
        .collect();
    assert_eq!(
        deletes[0].url.query_pairs().find(|(k, _)| k == "ids").unwrap().1,
        "srv~/a=1,srv~/a=2"
    );
}

#[tokio::test]
async fn test_delete_with_query_param_matcher() {
    let store = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/resources"))
        .and(query_param("ids", "srv~/a=1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&store)
        .await;
    let mut sync = InventorySync::new(SyncSettings::new(store.uri()));

    sync.sync_removed(&["srv~/a=1".into()]).await.unwrap();
}
