//! Segment-path addressing for the management-model protocol

use std::fmt;

use serde_json::{Map, Value, json};

use crate::inventory::NodeLocation;
use crate::protocol::{ProtocolError, ProtocolResult};

/// The wildcard segment value
pub const WILDCARD: &str = "*";

/// One `key=value` segment of a model path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelSegment {
    pub key: String,
    pub value: String,
}

impl ModelSegment {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.value == WILDCARD
    }
}

/// Address of a node in the hierarchical management model.
///
/// An absolute path starts at the model root (`/subsystem=datasources`);
/// a relative path (`data-source=*`) is resolved under a parent location.
/// The canonical form is the CLI-style rendering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelPath {
    absolute: bool,
    segments: Vec<ModelSegment>,
}

impl ModelPath {
    /// The model root (`/`).
    pub fn root() -> Self {
        Self {
            absolute: true,
            segments: Vec::new(),
        }
    }

    /// The empty relative path: resolves to whatever base it lands under.
    /// Attribute locations use this to mean "on the resource itself".
    pub fn empty() -> Self {
        Self {
            absolute: false,
            segments: Vec::new(),
        }
    }

    /// Parses a CLI-style path. A leading `/` makes the path absolute.
    pub fn parse(path: &str) -> ProtocolResult<Self> {
        let (absolute, rest) = match path.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, path),
        };
        if rest.is_empty() {
            if absolute {
                return Ok(Self::root());
            }
            return Err(ProtocolError::InvalidLocation(String::from("empty relative path")));
        }

        let mut segments = Vec::new();
        for part in rest.split('/') {
            match part.split_once('=') {
                Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                    segments.push(ModelSegment::new(key, value));
                }
                _ => {
                    return Err(ProtocolError::InvalidLocation(format!(
                        "segment [{part}] in [{path}] is not key=value"
                    )));
                }
            }
        }
        Ok(Self { absolute, segments })
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn segments(&self) -> &[ModelSegment] {
        &self.segments
    }

    /// Whether any segment carries the wildcard value.
    pub fn is_multi_target(&self) -> bool {
        self.segments.iter().any(ModelSegment::is_wildcard)
    }

    /// Returns this path appended under `base`.
    pub fn under(&self, base: &ModelPath) -> ModelPath {
        let mut segments = base.segments.clone();
        segments.extend(self.segments.iter().cloned());
        ModelPath {
            absolute: base.absolute,
            segments,
        }
    }

    /// The wire representation: a JSON list of one-entry objects.
    pub fn to_address(&self) -> Value {
        Value::Array(
            self.segments
                .iter()
                .map(|segment| json!({ segment.key.clone(): segment.value.clone() }))
                .collect(),
        )
    }

    /// Parses the wire representation back into an absolute path.
    pub fn from_address(address: &Value) -> ProtocolResult<Self> {
        let items = address.as_array().ok_or_else(|| {
            ProtocolError::Deserialization(format!("address is not a list: {address}"))
        })?;
        let mut segments = Vec::with_capacity(items.len());
        for item in items {
            let entry: &Map<String, Value> = item.as_object().ok_or_else(|| {
                ProtocolError::Deserialization(format!("address segment is not an object: {item}"))
            })?;
            let (key, value) = entry.iter().next().ok_or_else(|| {
                ProtocolError::Deserialization(String::from("empty address segment"))
            })?;
            let value = value.as_str().ok_or_else(|| {
                ProtocolError::Deserialization(format!("address segment value is not a string: {value}"))
            })?;
            segments.push(ModelSegment::new(key.clone(), value));
        }
        Ok(Self {
            absolute: true,
            segments,
        })
    }
}

impl fmt::Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str(if self.absolute { "/" } else { "" });
        }
        for (index, segment) in self.segments.iter().enumerate() {
            if self.absolute || index > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}={}", segment.key, segment.value)?;
        }
        Ok(())
    }
}

impl NodeLocation for ModelPath {}
