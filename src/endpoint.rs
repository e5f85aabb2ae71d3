//! Endpoint sessions and the discovery engine

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::inventory::{
    ID, MetricInstance, MetricUnit, Name, NodeLocation, Resource, ResourceManager,
    ResourceTypeManager, ids, tree::AddEffect,
};
use crate::protocol::{Driver, DriverFactory, LocationResolver, ProtocolDiagnostics, ProtocolResult};

/// Connection data for a remote endpoint. Absent connection data selects an
/// in-process transport where the protocol supports one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionData {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// One physical or virtual server instance being monitored.
#[derive(Debug, Clone)]
pub struct MonitoredEndpoint {
    pub name: String,
    pub connection: Option<ConnectionData>,
}

impl MonitoredEndpoint {
    pub fn new(name: impl Into<String>, connection: Option<ConnectionData>) -> Self {
        Self {
            name: name.into(),
            connection,
        }
    }
}

/// A live session against one endpoint: a freshly opened driver plus the
/// resolver. Dropped when the discovery pass is done; an abandoned session
/// simply goes away and the next pass starts fresh.
pub struct Session<L: NodeLocation> {
    pub endpoint: MonitoredEndpoint,
    pub driver: Box<dyn Driver<L>>,
    pub resolver: Arc<dyn LocationResolver<L>>,
}

/// One metric attribute read during a sampling pass.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub endpoint: String,
    pub resource_id: ID,
    pub metric_id: ID,
    pub name: Name,
    pub family: String,
    pub unit: MetricUnit,
    pub value: Value,
    pub sampled_at: DateTime<Utc>,
}

/// What one discovery pass found, relative to the previous pass.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome<L> {
    pub added: Vec<Resource<L>>,
    pub modified: Vec<Resource<L>>,
    pub removed: Vec<Resource<L>>,
    pub errors: usize,
    pub discovered_at: DateTime<Utc>,
}

impl<L> DiscoveryOutcome<L> {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Binds one [`MonitoredEndpoint`] to a driver factory, the shared resource
/// type graph and a resolver.
///
/// The service itself holds no mutable state; the resource tree it fills
/// belongs to the caller (the endpoint's actor), which is what keeps
/// discovery and sync for one endpoint serialized.
pub struct EndpointService<L: NodeLocation> {
    endpoint: MonitoredEndpoint,
    driver_factory: Arc<dyn DriverFactory<L>>,
    types: Arc<ResourceTypeManager<L>>,
    resolver: Arc<dyn LocationResolver<L>>,
    diagnostics: ProtocolDiagnostics,
}

impl<L: NodeLocation> EndpointService<L> {
    pub fn new(
        endpoint: MonitoredEndpoint,
        driver_factory: Arc<dyn DriverFactory<L>>,
        types: Arc<ResourceTypeManager<L>>,
        resolver: Arc<dyn LocationResolver<L>>,
        diagnostics: ProtocolDiagnostics,
    ) -> Self {
        Self {
            endpoint,
            driver_factory,
            types,
            resolver,
            diagnostics,
        }
    }

    pub fn endpoint(&self) -> &MonitoredEndpoint {
        &self.endpoint
    }

    pub fn types(&self) -> &ResourceTypeManager<L> {
        &self.types
    }

    pub fn diagnostics(&self) -> &ProtocolDiagnostics {
        &self.diagnostics
    }

    /// Opens a new session with a freshly opened driver connection.
    pub fn open_session(&self) -> ProtocolResult<Session<L>> {
        let driver = self.driver_factory.open()?;
        Ok(Session {
            endpoint: self.endpoint.clone(),
            driver,
            resolver: self.resolver.clone(),
        })
    }

    /// Discovers the full resource hierarchy of the endpoint.
    ///
    /// Walks the type graph breadth-first; for every type, queries the
    /// driver once per parent scope and feeds what it finds into `manager`,
    /// classifying each resource as added, modified or unchanged. A query
    /// failure in one subtree is logged and counted but does not abort the
    /// pass: partial inventory is preferable to none.
    ///
    /// When any errors occurred, resources that went undiscovered are kept
    /// rather than removed, so a flaky subtree never turns into a cascade
    /// of remote deletes.
    #[instrument(skip_all, fields(endpoint = %self.endpoint.name))]
    pub async fn discover_all(
        &self,
        session: &Session<L>,
        manager: &mut ResourceManager<L>,
    ) -> DiscoveryOutcome<L> {
        let discovered_at = Utc::now();
        let mut added = Vec::new();
        let mut modified = Vec::new();
        let mut discovered: HashSet<ID> = HashSet::new();
        let mut errors = 0usize;

        for resource_type in self.types.types_breadth_first() {
            // every scope is one driver query: the type's location template,
            // resolved under one parent instance (or standalone for roots)
            let parent_types = self.types.parents_of(&resource_type.id);
            let scopes: Vec<(Option<ID>, L)> = if parent_types.is_empty() {
                vec![(None, resource_type.location.clone())]
            } else {
                let parent_type_ids: HashSet<&ID> = parent_types.iter().map(|t| &t.id).collect();
                manager
                    .resources_breadth_first()
                    .into_iter()
                    .filter(|parent| parent_type_ids.contains(&parent.type_id))
                    .map(|parent| {
                        (
                            Some(parent.id.clone()),
                            self.resolver.absolutize(Some(&parent.location), &resource_type.location),
                        )
                    })
                    .collect()
            };

            for (parent_id, query) in scopes {
                let nodes = match session.driver.fetch_nodes(&query).await {
                    Ok(nodes) => nodes,
                    Err(e) => {
                        // the driver already marked its error rate
                        warn!("discovery of [{}] under [{query}] failed: {e}", resource_type.name);
                        errors += 1;
                        continue;
                    }
                };

                for location in nodes.into_keys() {
                    let (resource, property_errors) = self
                        .build_resource(session, resource_type, &query, location, parent_id.clone())
                        .await;
                    errors += property_errors;

                    let id = resource.id.clone();
                    match manager.add_resource(resource.clone()) {
                        Ok(AddEffect::Added) => {
                            discovered.insert(id);
                            added.push(resource);
                        }
                        Ok(AddEffect::Modified) => {
                            discovered.insert(id);
                            modified.push(resource);
                        }
                        Ok(AddEffect::Unchanged) => {
                            discovered.insert(id);
                        }
                        Err(e) => {
                            warn!("cannot add discovered resource: {e}");
                            errors += 1;
                        }
                    }
                }
            }
        }

        let removed = if errors == 0 {
            manager.retain_discovered(&discovered)
        } else {
            debug!("[{errors}] discovery errors - keeping undiscovered resources");
            Vec::new()
        };

        debug!(
            "discovery finished: [{}] added, [{}] modified, [{}] removed, [{}] in tree",
            added.len(),
            modified.len(),
            removed.len(),
            manager.len()
        );

        DiscoveryOutcome {
            added,
            modified,
            removed,
            errors,
            discovered_at,
        }
    }

    /// Builds one resource from a discovered node: stable id, templated
    /// display name, configuration property values and metric instances.
    /// Also returns the number of property read failures hit on the way;
    /// the resource still enters the tree with the properties it has.
    async fn build_resource(
        &self,
        session: &Session<L>,
        resource_type: &crate::inventory::ResourceType<L>,
        query: &L,
        location: L,
        parent_id: Option<ID>,
    ) -> (Resource<L>, usize) {
        let id = ids::generate_resource_id(&self.endpoint.name, &location.to_string());
        let name = Name::new(self.resolver.apply_template(
            &resource_type.name_template,
            query,
            &location,
            &self.endpoint.name,
        ));

        let mut properties = BTreeMap::new();
        let mut errors = 0usize;
        for property in &resource_type.config_properties {
            let attribute = self.resolver.absolutize_attribute(Some(&location), &property.attribute);
            match session.driver.fetch_attribute(&attribute).await {
                Ok(Some(value)) => {
                    properties.insert(property.name.to_string(), value);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("cannot read property [{}] of [{id}]: {e}", property.name);
                    errors += 1;
                }
            }
        }

        let metrics: Vec<MetricInstance<L>> = resource_type
            .metric_types
            .iter()
            .map(|metric_type| {
                let attribute = self.resolver.absolutize_attribute(Some(&location), &metric_type.attribute);
                MetricInstance::new(&id, metric_type, attribute)
            })
            .collect();

        let mut resource = Resource::new(id, name, resource_type.id.clone(), location)
            .with_properties(properties)
            .with_metrics(metrics);
        resource.parent_id = parent_id;

        (resource, errors)
    }

    /// Reads every metric instance of every resource in the tree.
    ///
    /// Read failures are logged and skipped; sampling one bad attribute
    /// must not starve the rest of the collection pass.
    #[instrument(skip_all, fields(endpoint = %self.endpoint.name))]
    pub async fn sample_all(&self, session: &Session<L>, manager: &ResourceManager<L>) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        let sampled_at = Utc::now();

        for resource in manager.resources_breadth_first() {
            for metric in &resource.metrics {
                let value = match session.driver.fetch_attribute(&metric.attribute).await {
                    Ok(Some(value)) => value,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("cannot sample [{}] of [{}]: {e}", metric.name, resource.id);
                        continue;
                    }
                };
                samples.push(MetricSample {
                    endpoint: self.endpoint.name.clone(),
                    resource_id: resource.id.clone(),
                    metric_id: metric.id.clone(),
                    name: metric.name.clone(),
                    family: metric.family.clone(),
                    unit: metric.unit,
                    value,
                    sampled_at,
                });
            }
        }
        samples
    }
}
