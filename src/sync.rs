//! Reconciliation of discovered inventory with the remote store
//!
//! The engine consumes what discovery produced and issues minimal HTTP
//! calls: one batched import per pass for everything that actually needs
//! (re-)persisting, one ids-only delete for everything that disappeared.
//! Both remote operations are idempotent, and `persisted_time` is bumped
//! only for resources that were actually sent, which is what guarantees
//! at-most-once, monotonic persistence. A pass with nothing to do issues
//! zero HTTP calls.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::endpoint::DiscoveryOutcome;
use crate::inventory::{
    ID, MetricUnit, Name, NodeLocation, Resource, ResourceManager, ResourceTypeManager,
};
use crate::util::apply_auth;

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised while talking to the remote inventory store
#[derive(Debug)]
pub enum SyncError {
    /// Network failure reaching the store
    Http(String),

    /// The store rejected an import or delete
    Rejected { status: u16, body: String },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Http(msg) => write!(f, "cannot reach inventory store: {msg}"),
            SyncError::Rejected { status, body } => {
                write!(f, "inventory store rejected request: status-code=[{status}], body=[{body}]")
            }
        }
    }
}

impl std::error::Error for SyncError {}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Http(err.to_string())
    }
}

/// Connection settings for the remote inventory store.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Resources are re-sent when their last confirmed sync is older than
    /// this, even if unchanged, so remote retention never loses them.
    pub refresh_interval: Duration,
}

impl SyncSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            password: None,
            refresh_interval: Duration::days(2),
        }
    }
}

/// What one sync cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub imported: usize,
    pub deleted: usize,
    pub requests: usize,
}

#[derive(Debug, Serialize, PartialEq)]
struct MetricPayload {
    id: ID,
    name: Name,
    family: String,
    unit: MetricUnit,
}

#[derive(Debug, Serialize, PartialEq)]
struct ResourcePayload {
    id: ID,
    name: Name,
    #[serde(rename = "typeId")]
    type_id: ID,
    #[serde(rename = "parentId", skip_serializing_if = "Option::is_none")]
    parent_id: Option<ID>,
    location: String,
    properties: BTreeMap<String, Value>,
    metrics: Vec<MetricPayload>,
}

#[derive(Debug, Serialize, PartialEq)]
struct TypePayload {
    id: ID,
    name: Name,
    location: String,
    parents: Vec<Name>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ImportPayload {
    resources: Vec<ResourcePayload>,
    types: Vec<TypePayload>,
}

fn resource_payload<L: NodeLocation>(resource: &Resource<L>) -> ResourcePayload {
    ResourcePayload {
        id: resource.id.clone(),
        name: resource.name.clone(),
        type_id: resource.type_id.clone(),
        parent_id: resource.parent_id.clone(),
        location: resource.location.to_string(),
        properties: resource.properties.clone(),
        metrics: resource
            .metrics
            .iter()
            .map(|metric| MetricPayload {
                id: metric.id.clone(),
                name: metric.name.clone(),
                family: metric.family.clone(),
                unit: metric.unit,
            })
            .collect(),
    }
}

/// Synchronizes one endpoint's inventory with the remote store.
///
/// Events for one endpoint are processed one at a time; the engine borrows
/// the endpoint's resource tree mutably, which makes racing persisted-time
/// updates impossible by construction. Retrying after a failure is the
/// caller's scheduling concern, not the engine's.
pub struct InventorySync {
    settings: SyncSettings,
    client: reqwest::Client,
    /// Types never change during the agent's lifetime, so each type id is
    /// sent with the first import that references it and skipped afterwards.
    synced_type_ids: HashSet<ID>,
}

impl InventorySync {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::builder()
                .timeout(StdDuration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            synced_type_ids: HashSet::new(),
        }
    }

    fn needs_refresh(&self, persisted_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match persisted_time {
            None => true,
            Some(persisted) => now - persisted > self.settings.refresh_interval,
        }
    }

    /// Reconciles a full discovery pass.
    ///
    /// A resource goes into the import batch when its `persisted_time`
    /// predates the pass *and* its own id or an ancestor's id is in the
    /// added/modified set - untouched subtrees are skipped. Resources whose
    /// last sync fell out of the refresh window are included regardless.
    pub async fn sync_discovery<L: NodeLocation>(
        &mut self,
        manager: &mut ResourceManager<L>,
        types: &ResourceTypeManager<L>,
        outcome: &DiscoveryOutcome<L>,
    ) -> SyncResult<SyncReport> {
        let changed: HashSet<&ID> = outcome
            .added
            .iter()
            .chain(outcome.modified.iter())
            .map(|resource| &resource.id)
            .collect();

        let now = Utc::now();
        let mut include: Vec<ID> = Vec::new();
        let mut payload_resources: Vec<ResourcePayload> = Vec::new();
        // breadth-first guarantees parents come before their children, so
        // the ancestor-changed flag is always computed before it is needed
        let mut subtree_changed: HashMap<ID, bool> = HashMap::new();
        for resource in manager.resources_breadth_first() {
            let ancestor_changed = resource
                .parent_id
                .as_ref()
                .and_then(|parent_id| subtree_changed.get(parent_id))
                .copied()
                .unwrap_or(false);
            let flagged = ancestor_changed || changed.contains(&resource.id);
            subtree_changed.insert(resource.id.clone(), flagged);

            let stale = resource.persisted_time.is_none_or(|persisted| persisted < outcome.discovered_at);
            if (flagged && stale) || self.needs_refresh(resource.persisted_time, now) {
                include.push(resource.id.clone());
                payload_resources.push(resource_payload(resource));
            }
        }

        let removed_ids: Vec<ID> = outcome.removed.iter().map(|resource| resource.id.clone()).collect();

        let mut report = SyncReport::default();
        if payload_resources.is_empty() && removed_ids.is_empty() {
            debug!("nothing to sync");
            return Ok(report);
        }

        if !payload_resources.is_empty() {
            let payload = self.build_import(payload_resources, types);
            report.imported = payload.resources.len();
            report.requests += 1;
            let sent_type_ids: Vec<ID> = payload.types.iter().map(|t| t.id.clone()).collect();
            self.post_import(&payload).await?;
            manager.set_persisted_time(include.iter(), now);
            self.synced_type_ids.extend(sent_type_ids);
            info!("imported [{}] resources", report.imported);
        }

        if !removed_ids.is_empty() {
            report.deleted = removed_ids.len();
            report.requests += 1;
            self.delete_resources(&removed_ids).await?;
            info!("deleted [{}] resources", report.deleted);
        }

        Ok(report)
    }

    /// Incremental path: imports exactly the given resources, no tree
    /// comparison.
    pub async fn sync_added_or_modified<L: NodeLocation>(
        &mut self,
        manager: &mut ResourceManager<L>,
        types: &ResourceTypeManager<L>,
        resources: &[Resource<L>],
    ) -> SyncResult<SyncReport> {
        if resources.is_empty() {
            return Ok(SyncReport::default());
        }
        let now = Utc::now();
        let payload = self.build_import(resources.iter().map(resource_payload).collect(), types);
        let report = SyncReport {
            imported: payload.resources.len(),
            deleted: 0,
            requests: 1,
        };
        let sent_type_ids: Vec<ID> = payload.types.iter().map(|t| t.id.clone()).collect();
        self.post_import(&payload).await?;
        manager.set_persisted_time(resources.iter().map(|resource| &resource.id), now);
        self.synced_type_ids.extend(sent_type_ids);
        Ok(report)
    }

    /// Incremental path: deletes exactly the given resources by id.
    pub async fn sync_removed(&mut self, resource_ids: &[ID]) -> SyncResult<SyncReport> {
        if resource_ids.is_empty() {
            return Ok(SyncReport::default());
        }
        self.delete_resources(resource_ids).await?;
        Ok(SyncReport {
            imported: 0,
            deleted: resource_ids.len(),
            requests: 1,
        })
    }

    fn build_import<L: NodeLocation>(
        &self,
        resources: Vec<ResourcePayload>,
        types: &ResourceTypeManager<L>,
    ) -> ImportPayload {
        let mut type_ids: Vec<&ID> = Vec::new();
        let mut seen: HashSet<&ID> = HashSet::new();
        for resource in &resources {
            if !self.synced_type_ids.contains(&resource.type_id) && seen.insert(&resource.type_id) {
                type_ids.push(&resource.type_id);
            }
        }
        let type_payloads = type_ids
            .into_iter()
            .filter_map(|id| types.get(id))
            .map(|resource_type| TypePayload {
                id: resource_type.id.clone(),
                name: resource_type.name.clone(),
                location: resource_type.location.to_string(),
                parents: resource_type.parents.clone(),
            })
            .collect();
        ImportPayload {
            resources,
            types: type_payloads,
        }
    }

    async fn post_import(&self, payload: &ImportPayload) -> SyncResult<()> {
        let url = format!("{}/import", self.settings.base_url.trim_end_matches('/'));
        let request = apply_auth(
            self.client.post(&url).json(payload),
            self.settings.username.as_deref(),
            self.settings.password.as_deref(),
        );
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn delete_resources(&self, resource_ids: &[ID]) -> SyncResult<()> {
        let url = format!("{}/resources", self.settings.base_url.trim_end_matches('/'));
        let ids = resource_ids.iter().map(ID::as_str).collect::<Vec<_>>().join(",");
        let request = apply_auth(
            self.client.delete(&url).query(&[("ids", ids.as_str())]),
            self.settings.username.as_deref(),
            self.settings.password.as_deref(),
        );
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}
