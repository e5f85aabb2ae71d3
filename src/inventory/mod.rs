//! Inventory model: resource types, resource instances and their graphs
//!
//! The inventory is split into a *type* side and an *instance* side:
//!
//! - [`types::TypeSet`] / [`type_graph::ResourceTypeManager`]: the schema.
//!   Built once from configuration, immutable afterwards, safe to share
//!   between discovery workers.
//! - [`resource::Resource`] / [`tree::ResourceManager`]: the live instances
//!   discovered on one endpoint. Owned by that endpoint's discovery/sync
//!   pipeline and rebuilt or incrementally updated once per discovery cycle.
//!
//! Both sides are generic over the protocol specific location type `L`
//! (see [`location::NodeLocation`]) so the same graph code serves the
//! hierarchical model protocol and the object-name protocol.

pub mod ids;
pub mod location;
pub mod resource;
pub mod tree;
pub mod type_graph;
pub mod types;

pub use ids::{ID, Name};
pub use location::{AttributeLocation, NodeLocation};
pub use resource::{MetricInstance, Resource};
pub use tree::{AddEffect, ResourceManager};
pub use type_graph::ResourceTypeManager;
pub use types::{ConfigPropertyType, MetricType, MetricUnit, ResourceType, TypeSet};

use std::fmt;

/// Result type alias for inventory graph operations
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Errors raised while building or mutating the inventory graphs
#[derive(Debug)]
pub enum InventoryError {
    /// A resource was added whose parent is not in the tree
    UnknownParent { resource: ID, parent: ID },

    /// Two resource types in enabled type sets share a name
    DuplicateTypeName(Name),

    /// A malformed id string was handed to a parser
    InvalidId(String),
}

impl fmt::Display for InventoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryError::UnknownParent { resource, parent } => {
                write!(f, "resource [{resource}] refers to unknown parent [{parent}]")
            }
            InventoryError::DuplicateTypeName(name) => {
                write!(f, "multiple resource types have the same name: {name}")
            }
            InventoryError::InvalidId(raw) => write!(f, "cannot parse invalid id: {raw}"),
        }
    }
}

impl std::error::Error for InventoryError {}
