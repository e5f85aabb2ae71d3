//! Resource type definitions: the schema side of the inventory

use serde::{Deserialize, Serialize};

use super::ids::{ID, Name};
use super::location::{AttributeLocation, NodeLocation};

/// Unit of a metric attribute, carried into the sync payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    #[default]
    None,
    Bytes,
    Milliseconds,
    Seconds,
    Percent,
}

/// Definition of one metric attribute exposed by a resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricType<L> {
    pub id: ID,
    pub name: Name,
    /// Where the metric value lives, relative to the resource instance
    pub attribute: AttributeLocation<L>,
    /// Metric family name used when exporting samples
    pub family: String,
    pub unit: MetricUnit,
}

/// Definition of one configuration property collected for a resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPropertyType<L> {
    pub name: Name,
    /// Where the property value lives, relative to the resource instance
    pub attribute: AttributeLocation<L>,
}

/// Schema of a class of resources: where instances live and what they expose.
///
/// A type may declare zero parents (a root type) or several (the type graph
/// is a DAG, not a tree). Parent references are by `Name` and resolved when
/// the type graph is built; a reference to a type that ended up disabled is
/// simply an absent edge.
#[derive(Debug, Clone)]
pub struct ResourceType<L> {
    pub id: ID,
    pub name: Name,
    /// Location template for instances of this type. Root types use an
    /// absolute location; child types are resolved under a parent instance.
    pub location: L,
    pub parents: Vec<Name>,
    pub metric_types: Vec<MetricType<L>>,
    pub config_properties: Vec<ConfigPropertyType<L>>,
    /// Template for instance display names; `%n` expands to the wildcard
    /// match portion of the instance location, `%e` to the endpoint name.
    pub name_template: String,
}

impl<L: NodeLocation> ResourceType<L> {
    pub fn new(name: impl Into<Name>, location: L) -> Self {
        let name = name.into();
        Self {
            id: ID::new(name.as_str()),
            name,
            location,
            parents: Vec::new(),
            metric_types: Vec::new(),
            config_properties: Vec::new(),
            name_template: String::from("%n"),
        }
    }

    pub fn with_parents(mut self, parents: impl IntoIterator<Item = Name>) -> Self {
        self.parents = parents.into_iter().collect();
        self
    }

    pub fn with_metric(mut self, metric: MetricType<L>) -> Self {
        self.metric_types.push(metric);
        self
    }

    pub fn with_config_property(mut self, property: ConfigPropertyType<L>) -> Self {
        self.config_properties.push(property);
        self
    }

    pub fn with_name_template(mut self, template: impl Into<String>) -> Self {
        self.name_template = template.into();
        self
    }
}

/// A named, independently enable/disable-able group of resource types.
///
/// Disabling a set removes its types from the graph, and transitively every
/// type left without a path to an enabled root (see
/// [`super::type_graph::ResourceTypeManager`]).
#[derive(Debug, Clone)]
pub struct TypeSet<L> {
    pub name: Name,
    pub enabled: bool,
    pub types: Vec<ResourceType<L>>,
}

impl<L: NodeLocation> TypeSet<L> {
    pub fn new(name: impl Into<Name>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            types: Vec::new(),
        }
    }

    pub fn with_type(mut self, resource_type: ResourceType<L>) -> Self {
        self.types.push(resource_type);
        self
    }
}
