//! Protocol drivers: unified access to heterogeneous management protocols
//!
//! Two very different wire protocols hide behind one contract here:
//!
//! - [`model`]: a hierarchical management-model protocol addressed by
//!   CLI-style segment paths (`/subsystem=datasources/data-source=*`)
//! - [`objname`]: an object-name/attribute protocol addressed by canonical
//!   name patterns (`domain:key=value,*`), with in-process and
//!   remote-HTTP-bridge transports
//!
//! A [`Driver`] executes queries and operations against a live endpoint; a
//! [`LocationResolver`] manipulates locations offline (no network). Drivers
//! hold a [`diagnostics::ProtocolDiagnostics`] collaborator and time every
//! network call separately from local post-processing, marking the error
//! rate exactly once per failed call.

pub mod diagnostics;
pub mod model;
pub mod objname;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::inventory::{AttributeLocation, NodeLocation};

pub use diagnostics::{DiagnosticsSnapshot, ProtocolDiagnostics};

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while talking to a managed endpoint.
///
/// All transport and deserialization failures are wrapped uniformly
/// regardless of the underlying protocol; the original cause is preserved
/// in the message, never swallowed.
#[derive(Debug)]
pub enum ProtocolError {
    /// Network failure talking to the endpoint
    Transport(String),

    /// The endpoint answered, but the payload could not be decoded
    Deserialization(String),

    /// The endpoint reported the request as failed
    OperationFailed(String),

    /// A location or attribute string could not be parsed
    InvalidLocation(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Transport(msg) => write!(f, "transport failure: {msg}"),
            ProtocolError::Deserialization(msg) => write!(f, "cannot decode response: {msg}"),
            ProtocolError::OperationFailed(msg) => write!(f, "management operation failed: {msg}"),
            ProtocolError::InvalidLocation(msg) => write!(f, "invalid location: {msg}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<reqwest::Error> for ProtocolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Deserialization(err.to_string())
    }
}

/// Offline manipulation of protocol specific locations.
///
/// Everything here must work without touching the network; live wildcard
/// expansion happens through [`Driver::fetch_nodes`].
pub trait LocationResolver<L: NodeLocation>: Send + Sync {
    /// Whether the location could refer to more than one target (it carries
    /// a wildcard). True does not imply there *are* multiple targets; the
    /// wildcard may match zero, one, or many live nodes.
    fn is_multi_target(&self, location: &L) -> bool;

    /// Whether `location` is one of the concrete targets `query` refers to.
    fn matches(&self, query: &L, location: &L) -> bool;

    /// Resolves `location` relative to `base`. May return `location`
    /// unchanged when it is already absolute or the protocol has no
    /// hierarchy.
    fn absolutize(&self, base: Option<&L>, location: &L) -> L;

    /// Given a multi-target query and one concrete location it matched,
    /// returns the portion of the concrete location that filled the
    /// wildcard.
    fn find_wildcard_match(&self, multi_target: &L, single: &L) -> ProtocolResult<String>;

    /// Resolves an attribute location relative to `base`.
    fn absolutize_attribute(&self, base: Option<&L>, attribute: &AttributeLocation<L>) -> AttributeLocation<L> {
        attribute.rebase(self.absolutize(base, attribute.location()))
    }

    /// Expands a display-name template for an instance found at `location`
    /// by a query for `template_location`. `%n` becomes the wildcard match
    /// portion (or the full canonical location when there is none), `%e`
    /// the endpoint name.
    fn apply_template(&self, template: &str, template_location: &L, location: &L, endpoint_name: &str) -> String {
        let node_part = if self.is_multi_target(template_location) {
            self.find_wildcard_match(template_location, location)
                .unwrap_or_else(|_| location.to_string())
        } else {
            location.to_string()
        };
        template.replace("%n", &node_part).replace("%e", endpoint_name)
    }
}

/// Protocol specific access to the resources of one monitored endpoint.
///
/// One implementation exists per wire protocol; they share this contract so
/// the discovery and sync engines stay protocol agnostic. Implementations
/// are selected at endpoint-configuration time and hold their diagnostics
/// collaborator by composition.
#[async_trait]
pub trait Driver<L: NodeLocation>: Send + Sync {
    /// Executes a search against the endpoint and returns the matching
    /// nodes keyed by their concrete location. The query may be
    /// multi-target; map ordering keeps wildcard expansion stable within a
    /// discovery pass.
    async fn fetch_nodes(&self, query: &L) -> ProtocolResult<BTreeMap<L, Value>>;

    /// Whether the attribute exists on the endpoint. Returns true for
    /// attributes that exist but are unset.
    async fn attribute_exists(&self, location: &AttributeLocation<L>) -> ProtocolResult<bool>;

    /// Fetches an attribute value.
    ///
    /// If the underlying query resolves to zero nodes this is `None` (not
    /// an error); one node yields the scalar value; more than one yields a
    /// list. Callers needing per-node correlation use
    /// [`Driver::fetch_attribute_as_map`]. A `#` sub-path in the attribute
    /// name reaches one level into structured values.
    async fn fetch_attribute(&self, location: &AttributeLocation<L>) -> ProtocolResult<Option<Value>>;

    /// Fetches an attribute value per concrete node, keyed by location.
    /// Short-circuits to a single fetch when the location is not
    /// multi-target.
    async fn fetch_attribute_as_map(
        &self,
        location: &AttributeLocation<L>,
    ) -> ProtocolResult<BTreeMap<L, Value>>;

    /// Invokes a remote management operation (e.g. shutdown, redeploy) on a
    /// single concrete target.
    async fn execute_operation(&self, target: &L, operation: &str, args: &[Value]) -> ProtocolResult<Value>;
}

/// Opens protocol driver connections for one endpoint.
///
/// A session gets a freshly opened driver; the factory is what an endpoint
/// service keeps across sessions.
pub trait DriverFactory<L: NodeLocation>: Send + Sync {
    fn open(&self) -> ProtocolResult<Box<dyn Driver<L>>>;
}

/// Digs a `#` sub-field out of a structured attribute value.
///
/// Shared by both protocol drivers: with no sub-path the value passes
/// through; with one, the value must be a structured (object) value.
pub(crate) fn extract_subfield(value: Value, subfield: Option<&str>) -> ProtocolResult<Value> {
    match subfield {
        None => Ok(value),
        Some(field) => match value {
            Value::Object(mut map) => Ok(map.remove(field).unwrap_or(Value::Null)),
            other => Err(ProtocolError::Deserialization(format!(
                "not a structured attribute value: cannot address sub-field [{field}] in {other}"
            ))),
        },
    }
}

/// Collapses per-node attribute values into the single-call result shape:
/// zero nodes is no value, one node is the scalar, several nodes a list.
pub(crate) fn collapse_values<L: NodeLocation>(values: BTreeMap<L, Value>) -> Option<Value> {
    let mut values: Vec<Value> = values.into_values().collect();
    match values.len() {
        0 => None,
        1 => Some(values.remove(0)),
        _ => Some(Value::Array(values)),
    }
}
