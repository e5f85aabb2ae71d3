use std::collections::BTreeMap;

use tracing::trace;

use crate::inventory::{
    AttributeLocation, ConfigPropertyType, MetricType, MetricUnit, Name, NodeLocation, ResourceType,
    TypeSet, ids,
};
use crate::protocol::ProtocolResult;

/// Which wire protocol an endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Hierarchical management-model protocol (segment paths)
    Model,
    /// Object-name/attribute protocol
    Objname,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub endpoints: Option<Vec<EndpointConfig>>,

    /// Remote inventory store; without it the agent discovers but never syncs
    pub sync: Option<SyncConfig>,

    /// Seconds between full discovery passes
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval: u64,

    /// Seconds between metric sampling passes
    #[serde(default = "default_sample_interval")]
    pub sample_interval: u64,

    #[serde(default)]
    pub model_type_sets: BTreeMap<String, TypeSetConfig>,

    #[serde(default)]
    pub objname_type_sets: BTreeMap<String, TypeSetConfig>,

    /// Type sets to exclude even when enabled
    #[serde(default)]
    pub ignored_type_sets: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub protocol: ProtocolKind,
    /// Absent url selects the in-process transport (object-name only)
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SyncConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Hours after which an unchanged resource is re-sent anyway
    #[serde(default = "default_refresh_hours")]
    pub refresh_hours: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TypeSetConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub types: BTreeMap<String, TypeConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TypeConfig {
    /// Location template; root types absolute, child types relative
    pub location: String,
    #[serde(default)]
    pub parents: Vec<String>,
    pub name_template: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    #[serde(default)]
    pub properties: Vec<PropertyConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MetricConfig {
    pub name: String,
    /// Attribute name, optionally with a `#subfield` sub-path
    pub attribute: String,
    /// Optional sub-location relative to the resource instance
    pub path: Option<String>,
    pub family: Option<String>,
    #[serde(default)]
    pub unit: MetricUnit,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PropertyConfig {
    pub name: String,
    pub attribute: String,
    pub path: Option<String>,
}

fn default_discovery_interval() -> u64 {
    300
}

fn default_sample_interval() -> u64 {
    30
}

fn default_refresh_hours() -> u64 {
    48
}

fn default_enabled() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}

/// Converts configured type sets into typed [`TypeSet`]s for one protocol.
///
/// `parse_location` turns an optional location string into a protocol
/// location; `None` means "on the resource instance itself" and is used for
/// metric and property attribute locations without an explicit path.
pub fn build_type_sets<L, P>(
    sets: &BTreeMap<String, TypeSetConfig>,
    parse_location: P,
) -> anyhow::Result<BTreeMap<Name, TypeSet<L>>>
where
    L: NodeLocation,
    P: Fn(Option<&str>) -> ProtocolResult<L>,
{
    let mut result = BTreeMap::new();
    for (set_name, set_config) in sets {
        let mut type_set = TypeSet::new(set_name.as_str(), set_config.enabled);
        for (type_name, type_config) in &set_config.types {
            let location = parse_location(Some(&type_config.location))?;
            let mut resource_type = ResourceType::new(type_name.as_str(), location)
                .with_parents(type_config.parents.iter().map(|p| Name::from(p.as_str())));
            if let Some(template) = &type_config.name_template {
                resource_type = resource_type.with_name_template(template.clone());
            }

            for metric in &type_config.metrics {
                let metric_location = parse_location(metric.path.as_deref())?;
                let metric_id = ids::generate_metric_instance_id(
                    &resource_type.id,
                    &crate::inventory::ID::new(metric.name.as_str()),
                );
                resource_type = resource_type.with_metric(MetricType {
                    id: metric_id,
                    name: Name::from(metric.name.as_str()),
                    attribute: AttributeLocation::new(metric_location, metric.attribute.as_str()),
                    family: metric.family.clone().unwrap_or_else(|| metric.name.clone()),
                    unit: metric.unit,
                });
            }

            for property in &type_config.properties {
                let property_location = parse_location(property.path.as_deref())?;
                resource_type = resource_type.with_config_property(ConfigPropertyType {
                    name: Name::from(property.name.as_str()),
                    attribute: AttributeLocation::new(property_location, property.attribute.as_str()),
                });
            }

            type_set = type_set.with_type(resource_type);
        }
        result.insert(type_set.name.clone(), type_set);
    }
    Ok(result)
}
