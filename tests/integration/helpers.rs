//! Test helpers shared by the integration tests

use std::collections::BTreeMap;
use std::sync::Arc;

use inventory_monitoring::endpoint::{EndpointService, MonitoredEndpoint};
use inventory_monitoring::inventory::{
    AttributeLocation, ConfigPropertyType, MetricType, MetricUnit, Name, ResourceType,
    ResourceTypeManager, TypeSet,
};
use inventory_monitoring::protocol::ProtocolDiagnostics;
use inventory_monitoring::protocol::objname::{
    LocalRegistry, ManagedRegistry, ObjectName, ObjectNameDriverFactory, ObjectNameResolver,
};
use serde_json::json;

pub fn name(text: &str) -> ObjectName {
    ObjectName::parse(text).unwrap()
}

/// A registry with one server object and two pools hanging off it.
pub fn pool_registry() -> Arc<LocalRegistry> {
    let registry = LocalRegistry::new();
    registry.register(
        name("app:type=Server"),
        BTreeMap::from([
            (String::from("version"), json!("1.0")),
            (String::from("bound-address"), json!("0.0.0.0")),
        ]),
    );
    registry.register(
        name("app:type=Pool,name=jobs"),
        BTreeMap::from([
            (String::from("size"), json!(4)),
            (String::from("stats"), json!({"active": 2})),
        ]),
    );
    registry.register(
        name("app:type=Pool,name=web"),
        BTreeMap::from([
            (String::from("size"), json!(8)),
            (String::from("stats"), json!({"active": 5})),
        ]),
    );
    Arc::new(registry)
}

/// Server (root) + Pool (child) type sets for the registry above.
pub fn pool_type_sets() -> BTreeMap<Name, TypeSet<ObjectName>> {
    let server = ResourceType::new("Server", name("app:type=Server"))
        .with_config_property(ConfigPropertyType {
            name: Name::from("version"),
            attribute: AttributeLocation::new(ObjectName::unset(), "version"),
        })
        .with_name_template("%e");

    let pool = ResourceType::new("Pool", name("app:type=Pool,name=*"))
        .with_parents([Name::from("Server")])
        .with_config_property(ConfigPropertyType {
            name: Name::from("size"),
            attribute: AttributeLocation::new(ObjectName::unset(), "size"),
        })
        .with_metric(MetricType {
            id: "Pool~active".into(),
            name: Name::from("active"),
            attribute: AttributeLocation::new(ObjectName::unset(), "stats#active"),
            family: String::from("pool_active"),
            unit: MetricUnit::None,
        });

    let mut sets = BTreeMap::new();
    let mut main = TypeSet::new("main", true);
    main.types.push(server);
    sets.insert(main.name.clone(), main);
    let mut pools = TypeSet::new("pools", true);
    pools.types.push(pool);
    sets.insert(pools.name.clone(), pools);
    sets
}

/// An in-process endpoint service over the given registry.
pub fn pool_service(registry: Arc<LocalRegistry>) -> EndpointService<ObjectName> {
    let endpoint = MonitoredEndpoint::new("test", None);
    let diagnostics = ProtocolDiagnostics::new();
    let types = Arc::new(ResourceTypeManager::new(&pool_type_sets(), None).unwrap());
    let factory = Arc::new(ObjectNameDriverFactory::new(
        endpoint.clone(),
        Some(registry as Arc<dyn ManagedRegistry>),
        diagnostics.clone(),
    ));
    EndpointService::new(endpoint, factory, types, Arc::new(ObjectNameResolver), diagnostics)
}
