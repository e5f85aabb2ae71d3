//! Drivers for the object-name protocol: in-process and remote bridge

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{trace, warn};

use crate::endpoint::{ConnectionData, MonitoredEndpoint};
use crate::inventory::AttributeLocation;
use crate::protocol::{
    Driver, DriverFactory, ProtocolDiagnostics, ProtocolError, ProtocolResult, collapse_values,
    extract_subfield,
};
use crate::util::apply_auth;

use super::name::ObjectName;
use super::registry::ManagedRegistry;

/// Opens object-name driver connections, picking the transport by whether
/// the endpoint carries connection data: with it, the remote HTTP bridge;
/// without it, the in-process registry.
pub struct ObjectNameDriverFactory {
    endpoint: MonitoredEndpoint,
    registry: Option<Arc<dyn ManagedRegistry>>,
    diagnostics: ProtocolDiagnostics,
}

impl ObjectNameDriverFactory {
    pub fn new(
        endpoint: MonitoredEndpoint,
        registry: Option<Arc<dyn ManagedRegistry>>,
        diagnostics: ProtocolDiagnostics,
    ) -> Self {
        Self {
            endpoint,
            registry,
            diagnostics,
        }
    }
}

impl DriverFactory<ObjectName> for ObjectNameDriverFactory {
    fn open(&self) -> ProtocolResult<Box<dyn Driver<ObjectName>>> {
        if self.endpoint.connection.is_some() {
            return Ok(Box::new(RemoteBridgeDriver::new(
                self.endpoint.clone(),
                self.diagnostics.clone(),
            )?));
        }
        match &self.registry {
            Some(registry) => Ok(Box::new(InProcessDriver::new(
                registry.clone(),
                self.diagnostics.clone(),
            ))),
            None => Err(ProtocolError::Transport(format!(
                "endpoint [{}] has neither connection data nor a local registry",
                self.endpoint.name
            ))),
        }
    }
}

/// Rewrites an any-local ("listen on all interfaces") address value to the
/// externally reachable host used to reach the endpoint. Applied only when
/// the substitution actually changes the value; everything else passes
/// through untouched.
fn normalize_any_local(value: Value, endpoint_host: Option<&str>) -> Value {
    if let (Some(host), Some(text)) = (endpoint_host, value.as_str()) {
        if let Ok(address) = text.parse::<IpAddr>() {
            if address.is_unspecified() && text != host {
                return Value::String(host.to_string());
            }
        }
    }
    value
}

fn endpoint_host(connection: Option<&ConnectionData>) -> Option<String> {
    let url = connection.map(|connection| connection.url.as_str())?;
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.host_str().map(str::to_string),
        Err(e) => {
            warn!("cannot parse endpoint url [{url}]: {e}");
            None
        }
    }
}

/// Driver calling straight into a local [`ManagedRegistry`], no network hop.
pub struct InProcessDriver {
    registry: Arc<dyn ManagedRegistry>,
    diagnostics: ProtocolDiagnostics,
}

impl InProcessDriver {
    pub fn new(registry: Arc<dyn ManagedRegistry>, diagnostics: ProtocolDiagnostics) -> Self {
        Self { registry, diagnostics }
    }

    fn resolve_targets(&self, location: &ObjectName) -> Vec<ObjectName> {
        if location.is_pattern() {
            self.registry.query_names(location)
        } else {
            vec![location.clone()]
        }
    }
}

#[async_trait]
impl Driver<ObjectName> for InProcessDriver {
    async fn fetch_nodes(&self, query: &ObjectName) -> ProtocolResult<BTreeMap<ObjectName, Value>> {
        let started = Instant::now();
        let names = self.registry.query_names(query);
        self.diagnostics.record_request(started.elapsed());

        Ok(names
            .into_iter()
            .map(|name| {
                let handle = Value::String(name.to_string());
                (name, handle)
            })
            .collect())
    }

    async fn attribute_exists(&self, location: &AttributeLocation<ObjectName>) -> ProtocolResult<bool> {
        let (attribute, _) = location.split_attribute();
        Ok(self
            .resolve_targets(location.location())
            .iter()
            .any(|name| self.registry.has_attribute(name, attribute)))
    }

    async fn fetch_attribute(&self, location: &AttributeLocation<ObjectName>) -> ProtocolResult<Option<Value>> {
        let values = self.fetch_attribute_as_map(location).await?;
        Ok(collapse_values(values))
    }

    async fn fetch_attribute_as_map(
        &self,
        location: &AttributeLocation<ObjectName>,
    ) -> ProtocolResult<BTreeMap<ObjectName, Value>> {
        let (attribute, subfield) = location.split_attribute();

        let targets = if location.location().is_pattern() {
            self.registry.query_names(location.location())
        } else {
            let single = location.location().clone();
            if self.registry.query_names(&single).is_empty() {
                return Ok(BTreeMap::new());
            }
            vec![single]
        };

        let mut values = BTreeMap::new();
        for name in targets {
            let started = Instant::now();
            let value = self.registry.get_attribute(&name, attribute).unwrap_or(Value::Null);
            self.diagnostics.record_request(started.elapsed());

            values.insert(name, extract_subfield(value, subfield)?);
        }
        Ok(values)
    }

    async fn execute_operation(
        &self,
        target: &ObjectName,
        operation: &str,
        args: &[Value],
    ) -> ProtocolResult<Value> {
        let started = Instant::now();
        let result = self.registry.invoke(target, operation, args);
        self.diagnostics.record_request(started.elapsed());

        result.map_err(|message| {
            self.diagnostics.mark_error();
            ProtocolError::OperationFailed(message)
        })
    }
}

/// Driver tunneling object-name operations over an HTTP+JSON bridge.
///
/// Requests carry a `type` of `search`, `read` or `exec`; responses wrap
/// the payload in `{"status": 200, "value": ...}`. Authentication is basic,
/// or bearer when the configured username is the bearer sentinel.
pub struct RemoteBridgeDriver {
    endpoint: MonitoredEndpoint,
    connection: ConnectionData,
    host: Option<String>,
    client: reqwest::Client,
    diagnostics: ProtocolDiagnostics,
}

impl RemoteBridgeDriver {
    pub fn new(endpoint: MonitoredEndpoint, diagnostics: ProtocolDiagnostics) -> ProtocolResult<Self> {
        let connection = endpoint.connection.clone().ok_or_else(|| {
            ProtocolError::Transport(format!(
                "endpoint [{}] has no connection data for the remote bridge",
                endpoint.name
            ))
        })?;
        let host = endpoint_host(Some(&connection));
        Ok(Self {
            endpoint,
            connection,
            host,
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            diagnostics,
        })
    }

    /// Sends one bridge request and unwraps the response envelope. The
    /// network round trip is timed on its own; any failure marks the error
    /// rate exactly once.
    async fn bridge_request(&self, body: Value) -> ProtocolResult<Value> {
        let result = self.bridge_request_inner(body).await;
        if result.is_err() {
            self.diagnostics.mark_error();
        }
        result
    }

    async fn bridge_request_inner(&self, body: Value) -> ProtocolResult<Value> {
        trace!("{}: bridge request: {body}", self.endpoint.name);
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
        if !status.is_success() {
            return Err(ProtocolError::Transport(format!("HTTP error: {status}")));
        }
        let envelope: Value = serde_json::from_slice(&bytes)?;
        match envelope.get("status").and_then(Value::as_u64) {
            Some(200) => Ok(envelope.get("value").cloned().unwrap_or(Value::Null)),
            _ => {
                let error = envelope
                    .get("error")
                    .map(Value::to_string)
                    .unwrap_or_else(|| envelope.to_string());
                Err(ProtocolError::OperationFailed(error))
            }
        }
    }
}

#[async_trait]
impl Driver<ObjectName> for RemoteBridgeDriver {
    async fn fetch_nodes(&self, query: &ObjectName) -> ProtocolResult<BTreeMap<ObjectName, Value>> {
        let value = self
            .bridge_request(json!({ "type": "search", "pattern": query.to_string() }))
            .await?;

        let names = value.as_array().ok_or_else(|| {
            ProtocolError::Deserialization(format!("search response is not a list: {value}"))
        })?;
        let mut nodes = BTreeMap::new();
        for name in names {
            let text = name.as_str().ok_or_else(|| {
                ProtocolError::Deserialization(format!("search result entry is not a string: {name}"))
            })?;
            nodes.insert(ObjectName::parse(text)?, Value::String(text.to_string()));
        }
        Ok(nodes)
    }

    async fn attribute_exists(&self, _location: &AttributeLocation<ObjectName>) -> ProtocolResult<bool> {
        // the bridge has no cheap existence probe; assume it exists
        Ok(true)
    }

    async fn fetch_attribute(&self, location: &AttributeLocation<ObjectName>) -> ProtocolResult<Option<Value>> {
        let values = self.fetch_attribute_as_map(location).await?;
        Ok(collapse_values(values))
    }

    async fn fetch_attribute_as_map(
        &self,
        location: &AttributeLocation<ObjectName>,
    ) -> ProtocolResult<BTreeMap<ObjectName, Value>> {
        let (attribute, subfield) = location.split_attribute();

        let targets: Vec<ObjectName> = if location.location().is_pattern() {
            self.fetch_nodes(location.location()).await?.into_keys().collect()
        } else {
            vec![location.location().clone()]
        };

        let mut values = BTreeMap::new();
        for name in targets {
            let value = self
                .bridge_request(json!({
                    "type": "read",
                    "name": name.to_string(),
                    "attribute": attribute,
                }))
                .await?;
            let value = extract_subfield(value, subfield)?;
            values.insert(name, normalize_any_local(value, self.host.as_deref()));
        }
        Ok(values)
    }

    async fn execute_operation(
        &self,
        target: &ObjectName,
        operation: &str,
        args: &[Value],
    ) -> ProtocolResult<Value> {
        self.bridge_request(json!({
            "type": "exec",
            "name": target.to_string(),
            "operation": operation,
            "args": args,
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_any_local_substitutes_only_unspecified() {
        let host = Some("srv.example.org");
        assert_eq!(
            normalize_any_local(json!("0.0.0.0"), host),
            json!("srv.example.org")
        );
        assert_eq!(normalize_any_local(json!("::"), host), json!("srv.example.org"));
        // already-concrete addresses and non-addresses pass through
        assert_eq!(normalize_any_local(json!("10.1.2.3"), host), json!("10.1.2.3"));
        assert_eq!(normalize_any_local(json!("not-an-ip"), host), json!("not-an-ip"));
        assert_eq!(normalize_any_local(json!(8080), host), json!(8080));
        // no endpoint host to substitute with
        assert_eq!(normalize_any_local(json!("0.0.0.0"), None), json!("0.0.0.0"));
    }
}
