//! Opaque identifiers for inventory entities
//!
//! `ID` is used for graph identity and equality, `Name` for display. Two
//! entities with equal `ID` are the same entity regardless of their names.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{InventoryError, InventoryResult};

/// Separator between the endpoint name and the protocol path in a resource id
const ID_SEPARATOR: char = '~';

/// Identity of an inventory entity. Opaque, case-preserving.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ID(String);

impl ID {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ID {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ID {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Display name of an inventory entity. Not part of identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The two parts that make up a generated resource id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdParts {
    pub endpoint_name: String,
    pub path: String,
}

/// Generates the id for a resource discovered on an endpoint.
///
/// The id is derived from the endpoint name and the protocol path of the
/// live node so the same node always maps to the same id across discovery
/// cycles. That stability is what the sync engine's diffing relies on.
pub fn generate_resource_id(endpoint_name: &str, protocol_path: &str) -> ID {
    ID::new(format!("{endpoint_name}{ID_SEPARATOR}{protocol_path}"))
}

/// Splits a generated resource id back into (endpoint name, protocol path).
///
/// Only the first separator is significant, so a path that itself starts
/// with the separator still splits into exactly two parts.
pub fn parse_resource_id(id: &ID) -> InventoryResult<ResourceIdParts> {
    let mut parts = id.as_str().splitn(2, ID_SEPARATOR);
    match (parts.next(), parts.next()) {
        (Some(endpoint), Some(path)) if !endpoint.is_empty() => Ok(ResourceIdParts {
            endpoint_name: endpoint.to_string(),
            path: path.to_string(),
        }),
        _ => Err(InventoryError::InvalidId(id.to_string())),
    }
}

/// Generates the id for a metric instance owned by a resource.
pub fn generate_metric_instance_id(resource_id: &ID, metric_type_id: &ID) -> ID {
    ID::new(format!("{resource_id}{ID_SEPARATOR}{metric_type_id}"))
}
