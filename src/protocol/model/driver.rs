//! HTTP driver for the hierarchical management-model protocol

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::trace;

use crate::endpoint::{ConnectionData, MonitoredEndpoint};
use crate::inventory::AttributeLocation;
use crate::protocol::{
    Driver, DriverFactory, ProtocolDiagnostics, ProtocolError, ProtocolResult, collapse_values,
    extract_subfield,
};
use crate::util::apply_auth;

use super::location::ModelPath;

/// Opens [`ModelDriver`] connections for one endpoint.
pub struct ModelDriverFactory {
    endpoint: MonitoredEndpoint,
    diagnostics: ProtocolDiagnostics,
}

impl ModelDriverFactory {
    pub fn new(endpoint: MonitoredEndpoint, diagnostics: ProtocolDiagnostics) -> Self {
        Self { endpoint, diagnostics }
    }
}

impl DriverFactory<ModelPath> for ModelDriverFactory {
    fn open(&self) -> ProtocolResult<Box<dyn Driver<ModelPath>>> {
        Ok(Box::new(ModelDriver::new(
            self.endpoint.clone(),
            self.diagnostics.clone(),
        )?))
    }
}

/// Driver speaking JSON requests against the endpoint's HTTP management
/// interface.
pub struct ModelDriver {
    endpoint: MonitoredEndpoint,
    connection: ConnectionData,
    client: reqwest::Client,
    diagnostics: ProtocolDiagnostics,
}

impl ModelDriver {
    /// Creates the driver. The model protocol is always remote, so the
    /// endpoint must carry connection data.
    pub fn new(endpoint: MonitoredEndpoint, diagnostics: ProtocolDiagnostics) -> ProtocolResult<Self> {
        let connection = endpoint.connection.clone().ok_or_else(|| {
            ProtocolError::Transport(format!(
                "endpoint [{}] has no connection data for the model protocol",
                endpoint.name
            ))
        })?;
        Ok(Self {
            endpoint,
            connection,
            // Read timeout is deliberately much longer than the connect
            // timeout: management interfaces can be slow to answer while
            // still being reachable.
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            diagnostics,
        })
    }

    pub fn diagnostics(&self) -> &ProtocolDiagnostics {
        &self.diagnostics
    }

    /// Sends one management request and returns the envelope's `result`.
    ///
    /// The network round trip is timed on its own; decoding and all other
    /// post-processing happen outside the timer. Any failure marks the
    /// error rate exactly once.
    async fn management_request(&self, body: Value) -> ProtocolResult<Value> {
        let result = self.management_request_inner(body).await;
        if result.is_err() {
            self.diagnostics.mark_error();
        }
        result
    }

    async fn management_request_inner(&self, body: Value) -> ProtocolResult<Value> {
        trace!("{}: management request: {body}", self.endpoint.name);
        let request = apply_auth(
            self.client.post(&self.connection.url).json(&body),
            self.connection.username.as_deref(),
            self.connection.password.as_deref(),
        );

        let started = Instant::now();
        let network = async {
            let response = request.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes))
        }
        .await;
        self.diagnostics.record_request(started.elapsed());

        let (status, bytes) = network?;
        let envelope: Value = serde_json::from_slice(&bytes).map_err(|e| {
            if status.is_success() {
                ProtocolError::Deserialization(e.to_string())
            } else {
                ProtocolError::Transport(format!("HTTP error: {status}"))
            }
        })?;

        match envelope.get("outcome").and_then(Value::as_str) {
            Some("success") => Ok(envelope.get("result").cloned().unwrap_or(Value::Null)),
            _ => {
                let description = envelope
                    .get("failure-description")
                    .map(Value::to_string)
                    .unwrap_or_else(|| format!("HTTP error: {status}"));
                Err(ProtocolError::OperationFailed(description))
            }
        }
    }

    /// Like [`Self::management_request`], but a "not found" failure comes
    /// back as `None` instead of an error: a missing target is zero
    /// results, and does not count against the error rate.
    async fn request_or_not_found(&self, body: Value) -> ProtocolResult<Option<Value>> {
        match self.management_request_inner(body).await {
            Ok(value) => Ok(Some(value)),
            Err(error) if Self::is_not_found(&error) => Ok(None),
            Err(error) => {
                self.diagnostics.mark_error();
                Err(error)
            }
        }
    }

    fn is_not_found(error: &ProtocolError) -> bool {
        matches!(error, ProtocolError::OperationFailed(description)
            if description.to_lowercase().contains("not found"))
    }
}

#[async_trait]
impl Driver<ModelPath> for ModelDriver {
    async fn fetch_nodes(&self, query: &ModelPath) -> ProtocolResult<BTreeMap<ModelPath, Value>> {
        let body = json!({
            "operation": "read-resource",
            "address": query.to_address(),
            "include-runtime": true,
        });
        let result = match self.request_or_not_found(body).await? {
            Some(result) => result,
            // a missing single target is zero results, not a failure
            None => return Ok(BTreeMap::new()),
        };

        let mut nodes = BTreeMap::new();
        match result {
            // wildcard queries answer with a list of (address, result) pairs
            Value::Array(items) => {
                for item in items {
                    let address = item.get("address").ok_or_else(|| {
                        ProtocolError::Deserialization(format!("list entry without address: {item}"))
                    })?;
                    let location = ModelPath::from_address(address)?;
                    nodes.insert(location, item.get("result").cloned().unwrap_or(Value::Null));
                }
            }
            Value::Null => {}
            single => {
                nodes.insert(query.clone(), single);
            }
        }
        Ok(nodes)
    }

    async fn attribute_exists(&self, location: &AttributeLocation<ModelPath>) -> ProtocolResult<bool> {
        let (attribute, _) = location.split_attribute();
        let nodes = self.fetch_nodes(location.location()).await?;
        Ok(nodes
            .values()
            .any(|node| node.as_object().is_some_and(|object| object.contains_key(attribute))))
    }

    async fn fetch_attribute(&self, location: &AttributeLocation<ModelPath>) -> ProtocolResult<Option<Value>> {
        let values = self.fetch_attribute_as_map(location).await?;
        Ok(collapse_values(values))
    }

    async fn fetch_attribute_as_map(
        &self,
        location: &AttributeLocation<ModelPath>,
    ) -> ProtocolResult<BTreeMap<ModelPath, Value>> {
        let (attribute, subfield) = location.split_attribute();

        let targets: Vec<ModelPath> = if location.location().is_multi_target() {
            self.fetch_nodes(location.location()).await?.into_keys().collect()
        } else {
            vec![location.location().clone()]
        };

        let mut values = BTreeMap::new();
        for target in targets {
            let body = json!({
                "operation": "read-attribute",
                "address": target.to_address(),
                "name": attribute,
            });
            let value = match self.request_or_not_found(body).await? {
                Some(value) => value,
                None => continue,
            };
            values.insert(target, extract_subfield(value, subfield)?);
        }
        Ok(values)
    }

    async fn execute_operation(
        &self,
        target: &ModelPath,
        operation: &str,
        args: &[Value],
    ) -> ProtocolResult<Value> {
        let mut body = json!({
            "operation": operation,
            "address": target.to_address(),
        });
        // named parameters ride as top-level request fields
        for arg in args {
            let params = arg.as_object().ok_or_else(|| {
                ProtocolError::InvalidLocation(format!(
                    "model operation arguments must be objects of named parameters, got {arg}"
                ))
            })?;
            for (key, value) in params {
                body[key] = value.clone();
            }
        }
        self.management_request(body).await
    }
}
