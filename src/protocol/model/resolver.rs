//! Offline resolution for model paths

use crate::protocol::{LocationResolver, ProtocolError, ProtocolResult};

use super::location::ModelPath;

/// Resolver for the hierarchical model protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelPathResolver;

impl LocationResolver<ModelPath> for ModelPathResolver {
    fn is_multi_target(&self, location: &ModelPath) -> bool {
        location.is_multi_target()
    }

    fn matches(&self, query: &ModelPath, location: &ModelPath) -> bool {
        let query_segments = query.segments();
        let location_segments = location.segments();
        if query_segments.len() != location_segments.len() {
            return false;
        }
        query_segments.iter().zip(location_segments).all(|(pattern, segment)| {
            pattern.key == segment.key && (pattern.is_wildcard() || pattern.value == segment.value)
        })
    }

    fn absolutize(&self, base: Option<&ModelPath>, location: &ModelPath) -> ModelPath {
        match base {
            Some(base) if !location.is_absolute() => location.under(base),
            _ => location.clone(),
        }
    }

    fn find_wildcard_match(&self, multi_target: &ModelPath, single: &ModelPath) -> ProtocolResult<String> {
        if multi_target.segments().len() != single.segments().len() {
            return Err(ProtocolError::InvalidLocation(format!(
                "[{single}] cannot match [{multi_target}]"
            )));
        }
        multi_target
            .segments()
            .iter()
            .zip(single.segments())
            .find(|(pattern, _)| pattern.is_wildcard())
            .map(|(_, segment)| segment.value.clone())
            .ok_or_else(|| {
                ProtocolError::InvalidLocation(format!("[{multi_target}] has no wildcard segment"))
            })
    }
}
