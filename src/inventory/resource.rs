//! Resource instances: the live side of the inventory

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::ids::{ID, Name};
use super::location::{AttributeLocation, NodeLocation};
use super::types::{MetricType, MetricUnit};

/// One metric attribute of a live resource, with its location already
/// resolved under the resource instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricInstance<L> {
    pub id: ID,
    pub name: Name,
    pub attribute: AttributeLocation<L>,
    pub family: String,
    pub unit: MetricUnit,
}

impl<L: NodeLocation> MetricInstance<L> {
    pub fn new(resource_id: &ID, metric_type: &MetricType<L>, attribute: AttributeLocation<L>) -> Self {
        Self {
            id: super::ids::generate_metric_instance_id(resource_id, &metric_type.id),
            name: metric_type.name.clone(),
            attribute,
            family: metric_type.family.clone(),
            unit: metric_type.unit,
        }
    }
}

/// A live, addressable manageable object discovered on a monitored endpoint.
///
/// Created only by the discovery engine and destroyed only through its
/// owning [`super::tree::ResourceManager`]. The id is globally unique per
/// endpoint (derived from endpoint name + protocol path), which keeps ids
/// stable across discovery cycles.
#[derive(Debug, Clone)]
pub struct Resource<L> {
    pub id: ID,
    pub name: Name,
    pub type_id: ID,
    pub location: L,
    pub parent_id: Option<ID>,
    pub properties: BTreeMap<String, Value>,
    pub metrics: Vec<MetricInstance<L>>,
    /// Last time this resource's state was confirmed written to the remote
    /// store. `None` until the first confirmed sync. Monotonically
    /// non-decreasing; only [`Resource::touch_persisted`] updates it.
    pub persisted_time: Option<DateTime<Utc>>,
}

impl<L: NodeLocation> Resource<L> {
    pub fn new(id: ID, name: Name, type_id: ID, location: L) -> Self {
        Self {
            id,
            name,
            type_id,
            location,
            parent_id: None,
            properties: BTreeMap::new(),
            metrics: Vec::new(),
            persisted_time: None,
        }
    }

    pub fn with_parent(mut self, parent_id: ID) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_properties(mut self, properties: BTreeMap<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<MetricInstance<L>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether this resource's observable state equals another discovery of
    /// the same node. Drives the added/modified/unchanged classification.
    ///
    /// `parent_id` is excluded: a multi-parent type can surface the same
    /// node under two parent instances, and the first discovery wins.
    /// `persisted_time` is bookkeeping, not state.
    pub fn same_state(&self, other: &Self) -> bool {
        self.name == other.name
            && self.type_id == other.type_id
            && self.location == other.location
            && self.properties == other.properties
            && self.metrics == other.metrics
    }

    /// Marks the resource as confirmed-synced at `time`. The stored value
    /// never moves backwards.
    pub fn touch_persisted(&mut self, time: DateTime<Utc>) {
        match self.persisted_time {
            Some(current) if current >= time => {}
            _ => self.persisted_time = Some(time),
        }
    }
}

impl<L: NodeLocation> fmt::Display for Resource<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] at {}", self.name, self.id, self.location)
    }
}
