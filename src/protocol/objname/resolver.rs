//! Offline resolution for object names

use crate::protocol::{LocationResolver, ProtocolResult};

use super::name::ObjectName;

/// Resolver for the object-name protocol.
///
/// Object names have no containment hierarchy, so `absolutize` passes
/// locations through unchanged; parent/child relationships between
/// resources come from the type graph alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectNameResolver;

impl LocationResolver<ObjectName> for ObjectNameResolver {
    fn is_multi_target(&self, location: &ObjectName) -> bool {
        location.is_pattern()
    }

    fn matches(&self, query: &ObjectName, location: &ObjectName) -> bool {
        query.matches(location)
    }

    fn absolutize(&self, base: Option<&ObjectName>, location: &ObjectName) -> ObjectName {
        match base {
            Some(base) if location.is_unset() => base.clone(),
            _ => location.clone(),
        }
    }

    fn find_wildcard_match(&self, multi_target: &ObjectName, single: &ObjectName) -> ProtocolResult<String> {
        multi_target.wildcard_match(single)
    }
}
