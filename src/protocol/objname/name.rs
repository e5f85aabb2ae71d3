//! Canonical object names and name patterns

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::inventory::NodeLocation;
use crate::protocol::{ProtocolError, ProtocolResult};

/// An object name or name pattern: `domain:key=value,key2=value2[,*]`.
///
/// The canonical form orders properties alphabetically, which makes
/// equality, hashing and ordering well defined for names that were written
/// with their properties in any order. `*` in the domain or in a property
/// value makes the name a pattern; a trailing `,*` accepts objects with
/// additional properties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectName {
    domain: String,
    properties: BTreeMap<String, String>,
    property_pattern: bool,
}

impl ObjectName {
    /// The unset name: resolves to whatever base it lands under. Attribute
    /// locations use this to mean "on the resource itself".
    pub fn unset() -> Self {
        Self {
            domain: String::new(),
            properties: BTreeMap::new(),
            property_pattern: false,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.domain.is_empty() && self.properties.is_empty() && !self.property_pattern
    }

    pub fn parse(name: &str) -> ProtocolResult<Self> {
        let (domain, rest) = name.split_once(':').ok_or_else(|| {
            ProtocolError::InvalidLocation(format!("object name [{name}] has no domain separator"))
        })?;
        if domain.is_empty() {
            return Err(ProtocolError::InvalidLocation(format!("object name [{name}] has an empty domain")));
        }

        let mut properties = BTreeMap::new();
        let mut property_pattern = false;
        for part in rest.split(',') {
            if part == "*" {
                property_pattern = true;
                continue;
            }
            match part.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    if properties.insert(key.to_string(), value.to_string()).is_some() {
                        return Err(ProtocolError::InvalidLocation(format!(
                            "object name [{name}] repeats property [{key}]"
                        )));
                    }
                }
                _ => {
                    return Err(ProtocolError::InvalidLocation(format!(
                        "property [{part}] in [{name}] is not key=value"
                    )));
                }
            }
        }
        if properties.is_empty() && !property_pattern {
            return Err(ProtocolError::InvalidLocation(format!("object name [{name}] has no properties")));
        }

        Ok(Self {
            domain: domain.to_string(),
            properties,
            property_pattern,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Whether this name is a pattern that may match zero or more objects.
    pub fn is_pattern(&self) -> bool {
        self.property_pattern
            || contains_wildcard(&self.domain)
            || self.properties.values().any(|value| contains_wildcard(value))
    }

    /// Whether this pattern matches the given concrete name.
    pub fn matches(&self, other: &ObjectName) -> bool {
        if !glob_matches(&self.domain, &other.domain) {
            return false;
        }
        for (key, pattern) in &self.properties {
            match other.properties.get(key) {
                Some(value) if glob_matches(pattern, value) => {}
                _ => return false,
            }
        }
        if !self.property_pattern && self.properties.len() != other.properties.len() {
            return false;
        }
        true
    }

    /// The value that filled the first wildcard property of this pattern in
    /// the given concrete name.
    pub fn wildcard_match(&self, other: &ObjectName) -> ProtocolResult<String> {
        for (key, pattern) in &self.properties {
            if contains_wildcard(pattern) {
                return other.properties.get(key).cloned().ok_or_else(|| {
                    ProtocolError::InvalidLocation(format!("[{other}] does not carry property [{key}]"))
                });
            }
        }
        if contains_wildcard(&self.domain) {
            return Ok(other.domain.clone());
        }
        if self.property_pattern {
            return Ok(other.to_string());
        }
        Err(ProtocolError::InvalidLocation(format!("[{self}] has no wildcard")))
    }
}

impl fmt::Display for ObjectName {
    /// Canonical rendering: domain, sorted properties, trailing `,*`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            return Ok(());
        }
        write!(f, "{}:", self.domain)?;
        let mut first = true;
        for (key, value) in &self.properties {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        if self.property_pattern {
            if !first {
                f.write_str(",")?;
            }
            f.write_str("*")?;
        }
        Ok(())
    }
}

impl NodeLocation for ObjectName {}

fn contains_wildcard(value: &str) -> bool {
    value.contains('*')
}

fn glob_matches(pattern: &str, value: &str) -> bool {
    if !contains_wildcard(pattern) {
        return pattern == value;
    }
    let regex = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
    Regex::new(&regex).map(|re| re.is_match(value)).unwrap_or(false)
}
