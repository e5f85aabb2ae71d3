//! Addressing primitives for nodes and attributes in a remote management tree

use std::fmt;
use std::hash::Hash;

/// Protocol specific address of a resource or query target.
///
/// Implementations are value types: equality and hashing identify the
/// addressed node, `Display` renders the textual canonical form, and `Ord`
/// gives wildcard expansions a stable order within a discovery pass so
/// downstream diffing stays deterministic.
pub trait NodeLocation:
    Clone + fmt::Debug + fmt::Display + PartialEq + Eq + PartialOrd + Ord + Hash + Send + Sync + 'static
{
}

/// Separator between an attribute name and a nested sub-field
pub const ATTRIBUTE_SUBPATH_SEPARATOR: char = '#';

/// A [`NodeLocation`] paired with an attribute name.
///
/// The attribute name may encode one additional level of sub-field
/// addressing with the `#` separator (`"attr#subfield"`), used to reach
/// into structured attribute values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeLocation<L> {
    location: L,
    attribute: String,
}

impl<L: NodeLocation> AttributeLocation<L> {
    pub fn new(location: L, attribute: impl Into<String>) -> Self {
        Self {
            location,
            attribute: attribute.into(),
        }
    }

    pub fn location(&self) -> &L {
        &self.location
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Returns the same attribute at a different location.
    pub fn rebase(&self, location: L) -> Self {
        Self {
            location,
            attribute: self.attribute.clone(),
        }
    }

    /// Splits the attribute name into (attribute, optional sub-field).
    pub fn split_attribute(&self) -> (&str, Option<&str>) {
        match self.attribute.split_once(ATTRIBUTE_SUBPATH_SEPARATOR) {
            Some((main, sub)) => (main, Some(sub)),
            None => (self.attribute.as_str(), None),
        }
    }
}

impl<L: NodeLocation> fmt::Display for AttributeLocation<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.location, self.attribute)
    }
}
