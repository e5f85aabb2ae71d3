//! Failure and protocol-detail scenarios against mock HTTP endpoints
//!
//! These tests verify that:
//! - The model driver speaks the management wire format end to end
//! - A failing subtree neither aborts the pass nor triggers removals
//! - "not found" answers are zero results, not errors
//! - `fetch_attribute_as_map` on a single target equals one fetch
//! - Failed protocol calls mark the error-rate counter
//! - The remote bridge sends bearer tokens for the sentinel username

use std::sync::Arc;

use inventory_monitoring::endpoint::{ConnectionData, EndpointService, MonitoredEndpoint};
use inventory_monitoring::inventory::{
    AttributeLocation, ConfigPropertyType, Name, ResourceManager, ResourceType,
    ResourceTypeManager, TypeSet,
};
use inventory_monitoring::protocol::model::{
    ModelDriver, ModelDriverFactory, ModelPath, ModelPathResolver,
};
use inventory_monitoring::protocol::objname::{ObjectName, RemoteBridgeDriver};
use inventory_monitoring::protocol::{Driver, ProtocolDiagnostics};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn mpath(p: &str) -> ModelPath {
    ModelPath::parse(p).unwrap()
}

/// Responder for a management endpoint with one datasources subsystem and
/// two datasources. When `fail_children` is set, the wildcard child query
/// answers with a server error instead.
fn management_responder(fail_children: bool) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync {
    move |request: &Request| {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let operation = body["operation"].as_str().unwrap_or_default();
        let address = &body["address"];

        if operation == "read-resource" && address == &json!([{"subsystem": "datasources"}]) {
            return ResponseTemplate::new(200)
                .set_body_json(json!({"outcome": "success", "result": {"installed-drivers": ["h2"]}}));
        }
        if operation == "read-resource"
            && address == &json!([{"subsystem": "datasources"}, {"data-source": "*"}])
        {
            if fail_children {
                return ResponseTemplate::new(500).set_body_json(
                    json!({"outcome": "failed", "failure-description": "internal error"}),
                );
            }
            return ResponseTemplate::new(200).set_body_json(json!({
                "outcome": "success",
                "result": [
                    {
                        "address": [{"subsystem": "datasources"}, {"data-source": "ExampleDS"}],
                        "result": {"jndi-name": "java:/ExampleDS"}
                    },
                    {
                        "address": [{"subsystem": "datasources"}, {"data-source": "OtherDS"}],
                        "result": {"jndi-name": "java:/OtherDS"}
                    }
                ]
            }));
        }
        if operation == "read-attribute" && body["name"] == json!("connection-url") {
            let target = address[1]["data-source"].as_str().unwrap_or_default();
            return ResponseTemplate::new(200)
                .set_body_json(json!({"outcome": "success", "result": format!("jdbc:h2:mem:{target}")}));
        }
        ResponseTemplate::new(500).set_body_json(
            json!({"outcome": "failed", "failure-description": "no such operation"}),
        )
    }
}

fn datasource_type_sets() -> BTreeMap<Name, TypeSet<ModelPath>> {
    let subsystem = ResourceType::new("Datasources Subsystem", mpath("/subsystem=datasources"));
    let datasource = ResourceType::new("Datasource", mpath("data-source=*"))
        .with_parents([Name::from("Datasources Subsystem")])
        .with_config_property(ConfigPropertyType {
            name: Name::from("Connection URL"),
            attribute: AttributeLocation::new(ModelPath::empty(), "connection-url"),
        });

    let mut sets = BTreeMap::new();
    let mut set = TypeSet::new("datasources", true);
    set.types.push(subsystem);
    set.types.push(datasource);
    sets.insert(set.name.clone(), set);
    sets
}

fn model_endpoint(url: String) -> MonitoredEndpoint {
    MonitoredEndpoint::new(
        "srv",
        Some(ConnectionData {
            url,
            username: None,
            password: None,
        }),
    )
}

fn model_service(url: String, diagnostics: ProtocolDiagnostics) -> EndpointService<ModelPath> {
    let endpoint = model_endpoint(url);
    let types = Arc::new(ResourceTypeManager::new(&datasource_type_sets(), None).unwrap());
    let factory = Arc::new(ModelDriverFactory::new(endpoint.clone(), diagnostics.clone()));
    EndpointService::new(endpoint, factory, types, Arc::new(ModelPathResolver), diagnostics)
}

#[tokio::test]
async fn test_model_discovery_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/management"))
        .respond_with(management_responder(false))
        .mount(&server)
        .await;

    let diagnostics = ProtocolDiagnostics::new();
    let service = model_service(format!("{}/management", server.uri()), diagnostics.clone());
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();

    let outcome = service.discover_all(&session, &mut manager).await;
    assert_eq!(outcome.errors, 0);
    assert_eq!(outcome.added.len(), 3);

    let order: Vec<String> = manager
        .resources_breadth_first()
        .iter()
        .map(|r| r.location.to_string())
        .collect();
    assert_eq!(
        order,
        vec![
            "/subsystem=datasources",
            "/subsystem=datasources/data-source=ExampleDS",
            "/subsystem=datasources/data-source=OtherDS",
        ]
    );

    let example = manager
        .get_resource(&"srv~/subsystem=datasources/data-source=ExampleDS".into())
        .unwrap();
    assert_eq!(example.name.as_str(), "ExampleDS");
    assert_eq!(
        example.properties.get("Connection URL"),
        Some(&json!("jdbc:h2:mem:ExampleDS"))
    );

    let snapshot = diagnostics.snapshot();
    assert!(snapshot.request_count >= 3);
    assert_eq!(snapshot.error_count, 0);
}

#[tokio::test]
async fn test_subtree_failure_keeps_previous_resources() {
    // first pass against a healthy endpoint
    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/management"))
        .respond_with(management_responder(false))
        .mount(&healthy)
        .await;
    let service = model_service(format!("{}/management", healthy.uri()), ProtocolDiagnostics::new());
    let session = service.open_session().unwrap();
    let mut manager = ResourceManager::new();
    service.discover_all(&session, &mut manager).await;
    assert_eq!(manager.len(), 3);

    // second pass against an endpoint whose child query fails: the pass
    // continues, but nothing is treated as removed
    let flaky = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/management"))
        .respond_with(management_responder(true))
        .mount(&flaky)
        .await;
    let diagnostics = ProtocolDiagnostics::new();
    let flaky_service = model_service(format!("{}/management", flaky.uri()), diagnostics.clone());
    let flaky_session = flaky_service.open_session().unwrap();

    let outcome = flaky_service.discover_all(&flaky_session, &mut manager).await;
    assert!(outcome.errors > 0);
    assert!(outcome.removed.is_empty());
    assert_eq!(manager.len(), 3);
    assert!(diagnostics.snapshot().error_count > 0);
}

#[tokio::test]
async fn test_not_found_single_target_is_zero_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/management"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "outcome": "failed",
            "failure-description": "WFLYCTL0216: Management resource not found"
        })))
        .mount(&server)
        .await;

    let diagnostics = ProtocolDiagnostics::new();
    let driver = ModelDriver::new(
        model_endpoint(format!("{}/management", server.uri())),
        diagnostics.clone(),
    )
    .unwrap();

    let nodes = driver.fetch_nodes(&mpath("/subsystem=missing")).await.unwrap();
    assert!(nodes.is_empty());
    // zero results, not a failure
    assert_eq!(diagnostics.snapshot().error_count, 0);
}

#[tokio::test]
async fn test_fetch_attribute_as_map_singleton_equivalence() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/management"))
        .respond_with(management_responder(false))
        .mount(&server)
        .await;

    let driver = ModelDriver::new(
        model_endpoint(format!("{}/management", server.uri())),
        ProtocolDiagnostics::new(),
    )
    .unwrap();

    let location = AttributeLocation::new(
        mpath("/subsystem=datasources/data-source=ExampleDS"),
        "connection-url",
    );
    let scalar = driver.fetch_attribute(&location).await.unwrap();
    let map = driver.fetch_attribute_as_map(&location).await.unwrap();

    assert_eq!(map.len(), 1);
    assert_eq!(map.values().next().cloned(), scalar);
    assert_eq!(
        map.keys().next().unwrap().to_string(),
        "/subsystem=datasources/data-source=ExampleDS"
    );
}

#[tokio::test]
async fn test_failed_call_marks_error_rate_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/management"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let diagnostics = ProtocolDiagnostics::new();
    let driver = ModelDriver::new(
        model_endpoint(format!("{}/management", server.uri())),
        diagnostics.clone(),
    )
    .unwrap();

    let result = driver
        .execute_operation(&mpath("/subsystem=datasources"), "flush", &[])
        .await;
    assert!(result.is_err());
    assert_eq!(diagnostics.snapshot().error_count, 1);
    assert_eq!(diagnostics.snapshot().request_count, 1);
}

#[tokio::test]
async fn test_bridge_driver_sends_bearer_token_for_sentinel_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 200, "value": []})))
        .mount(&server)
        .await;

    let endpoint = MonitoredEndpoint::new(
        "srv",
        Some(ConnectionData {
            url: server.uri(),
            username: Some(String::from("_bearer")),
            password: Some(String::from("token-123")),
        }),
    );
    let driver = RemoteBridgeDriver::new(endpoint, ProtocolDiagnostics::new()).unwrap();

    let nodes = driver
        .fetch_nodes(&ObjectName::parse("app:type=Pool,name=*").unwrap())
        .await
        .unwrap();
    assert!(nodes.is_empty());
}
