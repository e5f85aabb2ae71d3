//! Integration tests for the discovery engine and endpoint actor
//!
//! These tests verify that:
//! - Discovery walks the type graph and builds the expected tree
//! - Ids stay stable and repeated passes report no changes
//! - Removals on the endpoint cascade through the tree
//! - Sampling reads metric attributes through the driver
//! - The endpoint actor publishes inventory events

use inventory_monitoring::actors::{EndpointHandle, EndpointScheduling, InventoryEvent, MetricEvent};
use inventory_monitoring::inventory::ResourceManager;
use inventory_monitoring::protocol::objname::ObjectName;
use serde_json::json;
use tokio::sync::broadcast;

use crate::helpers::{name, pool_registry, pool_service};

#[tokio::test]
async fn test_discovery_builds_expected_tree() {
    let registry = pool_registry();
    let service = pool_service(registry);
    let session = service.open_session().unwrap();
    let mut manager: ResourceManager<ObjectName> = ResourceManager::new();

    let outcome = service.discover_all(&session, &mut manager).await;
    assert_eq!(outcome.errors, 0);
    assert_eq!(outcome.added.len(), 3);
    assert!(outcome.modified.is_empty());
    assert!(outcome.removed.is_empty());

    // one root (the server), pools below it, in stable canonical order
    let order: Vec<String> = manager
        .resources_breadth_first()
        .iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(
        order,
        vec![
            "test~app:type=Server",
            "test~app:name=jobs,type=Pool",
            "test~app:name=web,type=Pool",
        ]
    );

    let server = manager.get_resource(&"test~app:type=Server".into()).unwrap();
    assert_eq!(server.name.as_str(), "test");
    assert_eq!(server.properties.get("version"), Some(&json!("1.0")));
    assert!(server.parent_id.is_none());

    let jobs = manager.get_resource(&"test~app:name=jobs,type=Pool".into()).unwrap();
    assert_eq!(jobs.name.as_str(), "jobs");
    assert_eq!(jobs.parent_id.as_ref().unwrap().as_str(), "test~app:type=Server");
    assert_eq!(jobs.properties.get("size"), Some(&json!(4)));
    assert_eq!(jobs.metrics.len(), 1);
}

#[tokio::test]
async fn test_rediscovery_is_unchanged() {
    let registry = pool_registry();
    let service = pool_service(registry);
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();

    service.discover_all(&session, &mut manager).await;
    let second = service.discover_all(&session, &mut manager).await;

    assert!(second.is_noop());
    assert_eq!(manager.len(), 3);
}

#[tokio::test]
async fn test_endpoint_removal_is_seen_as_removed() {
    let registry = pool_registry();
    let service = pool_service(registry.clone());
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();

    service.discover_all(&session, &mut manager).await;
    registry.unregister(&name("app:type=Pool,name=web"));

    let outcome = service.discover_all(&session, &mut manager).await;
    assert_eq!(outcome.removed.len(), 1);
    assert_eq!(outcome.removed[0].id.as_str(), "test~app:name=web,type=Pool");
    assert_eq!(manager.len(), 2);
}

#[tokio::test]
async fn test_attribute_change_reports_modified() {
    let registry = pool_registry();
    let service = pool_service(registry.clone());
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();

    service.discover_all(&session, &mut manager).await;
    registry.set_attribute(&name("app:type=Pool,name=jobs"), "size", json!(16));

    let outcome = service.discover_all(&session, &mut manager).await;
    assert!(outcome.added.is_empty());
    assert_eq!(outcome.modified.len(), 1);
    assert_eq!(outcome.modified[0].id.as_str(), "test~app:name=jobs,type=Pool");
}

#[tokio::test]
async fn test_sampling_reads_metric_attributes() {
    let registry = pool_registry();
    let service = pool_service(registry);
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();

    service.discover_all(&session, &mut manager).await;
    let samples = service.sample_all(&session, &manager).await;

    // one metric per pool, reached through the # sub-path
    assert_eq!(samples.len(), 2);
    let jobs = samples.iter().find(|s| s.resource_id.as_str() == "test~app:name=jobs,type=Pool").unwrap();
    assert_eq!(jobs.value, json!(2));
    assert_eq!(jobs.family, "pool_active");
}

#[tokio::test]
async fn test_actor_publishes_discovery_event() {
    let registry = pool_registry();
    let service = pool_service(registry);

    let (event_tx, mut event_rx) = broadcast::channel::<InventoryEvent<ObjectName>>(16);
    let (metric_tx, _metric_rx) = broadcast::channel::<MetricEvent>(16);
    let scheduling = EndpointScheduling {
        discovery_interval: std::time::Duration::from_secs(3600),
        sample_interval: std::time::Duration::from_secs(3600),
    };
    let handle = EndpointHandle::spawn(service, None, scheduling, event_tx, metric_tx);

    let report = handle.discover_now().await.unwrap();
    assert_eq!(report.requests, 0); // no sync engine configured

    let event = tokio::time::timeout(std::time::Duration::from_millis(500), event_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        InventoryEvent::Discovery { added, full_tree, .. } => {
            assert_eq!(added.len(), 3);
            assert_eq!(full_tree.len(), 3);
        }
        other => panic!("expected a discovery event, got {other:?}"),
    }

    handle.shutdown().await.unwrap();
}
