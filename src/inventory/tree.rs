//! The resource instance tree

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::ids::ID;
use super::location::NodeLocation;
use super::resource::Resource;
use super::{InventoryError, InventoryResult};
use crate::protocol::LocationResolver;

/// Effect of adding a resource to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddEffect {
    /// The resource was not known before
    Added,
    /// The resource was known but its state changed
    Modified,
    /// The resource was known and its state is identical
    Unchanged,
}

/// Holds the forest of resource instances for one endpoint.
///
/// Resources live in an arena keyed by id; parent/child relationships are id
/// references in side maps, so removal with cascade is a pure index
/// operation. The manager is owned exclusively by its endpoint's
/// discovery/sync pipeline and must not be mutated from more than one thread
/// at a time.
pub struct ResourceManager<L> {
    resources: HashMap<ID, Resource<L>>,
    children: HashMap<ID, Vec<ID>>,
    /// Root resource ids in insertion order. The breadth-first listing
    /// contract depends on this order being stable.
    roots: Vec<ID>,
}

impl<L: NodeLocation> Default for ResourceManager<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: NodeLocation> ResourceManager<L> {
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
            children: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Adds or refreshes a resource.
    ///
    /// A resource with a known id is classified against the stored state:
    /// identical state reports [`AddEffect::Unchanged`] and keeps the stored
    /// entry, changed state replaces the entry (carrying the persisted time
    /// forward) and reports [`AddEffect::Modified`].
    ///
    /// The parent, when set, must already be in the tree.
    pub fn add_resource(&mut self, resource: Resource<L>) -> InventoryResult<AddEffect> {
        if let Some(parent_id) = &resource.parent_id {
            if !self.resources.contains_key(parent_id) {
                return Err(InventoryError::UnknownParent {
                    resource: resource.id.clone(),
                    parent: parent_id.clone(),
                });
            }
        }

        match self.resources.get(&resource.id) {
            None => {
                self.link(&resource);
                self.resources.insert(resource.id.clone(), resource);
                Ok(AddEffect::Added)
            }
            Some(existing) if existing.same_state(&resource) => Ok(AddEffect::Unchanged),
            Some(existing) => {
                let persisted_time = existing.persisted_time;
                let previous_parent = existing.parent_id.clone();
                let mut resource = resource;
                if resource.persisted_time.is_none() {
                    resource.persisted_time = persisted_time;
                }
                if previous_parent != resource.parent_id {
                    self.unlink(&resource.id, previous_parent.as_ref());
                    self.link(&resource);
                }
                self.resources.insert(resource.id.clone(), resource);
                Ok(AddEffect::Modified)
            }
        }
    }

    fn link(&mut self, resource: &Resource<L>) {
        match &resource.parent_id {
            Some(parent_id) => {
                self.children.entry(parent_id.clone()).or_default().push(resource.id.clone());
            }
            None => self.roots.push(resource.id.clone()),
        }
    }

    fn unlink(&mut self, id: &ID, parent_id: Option<&ID>) {
        match parent_id {
            Some(parent_id) => {
                if let Some(siblings) = self.children.get_mut(parent_id) {
                    siblings.retain(|sibling| sibling != id);
                }
            }
            None => self.roots.retain(|root| root != id),
        }
    }

    pub fn get_resource(&self, id: &ID) -> Option<&Resource<L>> {
        self.resources.get(id)
    }

    /// Direct parent, or `None` for a root resource. O(1).
    pub fn parent_of(&self, resource: &Resource<L>) -> Option<&Resource<L>> {
        resource.parent_id.as_ref().and_then(|id| self.resources.get(id))
    }

    /// Direct children in insertion order. O(1) lookup.
    pub fn children_of(&self, resource: &Resource<L>) -> Vec<&Resource<L>> {
        self.children
            .get(&resource.id)
            .map(|ids| ids.iter().filter_map(|id| self.resources.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn root_resources(&self) -> Vec<&Resource<L>> {
        self.roots.iter().filter_map(|id| self.resources.get(id)).collect()
    }

    /// All resources: each root in insertion order, followed by its full
    /// breadth-first subtree, before the next root.
    ///
    /// This ordering is a contract, not an implementation detail; the sync
    /// engine's diffing and the tests depend on it.
    pub fn resources_breadth_first(&self) -> Vec<&Resource<L>> {
        let mut result = Vec::with_capacity(self.resources.len());
        for root in &self.roots {
            let mut queue: VecDeque<&ID> = VecDeque::new();
            queue.push_back(root);
            while let Some(id) = queue.pop_front() {
                if let Some(resource) = self.resources.get(id) {
                    result.push(resource);
                }
                if let Some(child_ids) = self.children.get(id) {
                    queue.extend(child_ids.iter());
                }
            }
        }
        result
    }

    /// Resources whose location matches the given query, in breadth-first
    /// order. The query may be multi-target.
    pub fn find_resources(&self, query: &L, resolver: &dyn LocationResolver<L>) -> Vec<&Resource<L>> {
        self.resources_breadth_first()
            .into_iter()
            .filter(|resource| resolver.matches(query, &resource.location))
            .collect()
    }

    /// Removes every resource matching the query, and all of their
    /// descendants, in one atomic operation. Returns the removed resources.
    /// Removing an already-absent target is a no-op, not an error.
    pub fn remove_resources(&mut self, query: &L, resolver: &dyn LocationResolver<L>) -> Vec<Resource<L>> {
        let matching: Vec<ID> = self
            .resources_breadth_first()
            .into_iter()
            .filter(|resource| resolver.matches(query, &resource.location))
            .map(|resource| resource.id.clone())
            .collect();
        self.remove_with_descendants(matching)
    }

    /// Removes every resource whose id is not in `discovered`, cascading to
    /// descendants. Called after a full discovery scan: whatever the scan did
    /// not see anymore is gone from the endpoint.
    pub fn retain_discovered(&mut self, discovered: &HashSet<ID>) -> Vec<Resource<L>> {
        let missing: Vec<ID> = self
            .resources_breadth_first()
            .into_iter()
            .filter(|resource| !discovered.contains(&resource.id))
            .map(|resource| resource.id.clone())
            .collect();
        self.remove_with_descendants(missing)
    }

    fn remove_with_descendants(&mut self, seeds: Vec<ID>) -> Vec<Resource<L>> {
        let mut doomed: Vec<ID> = Vec::new();
        let mut seen: HashSet<ID> = HashSet::new();
        let mut queue: VecDeque<ID> = seeds.into();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(child_ids) = self.children.get(&id) {
                queue.extend(child_ids.iter().cloned());
            }
            doomed.push(id);
        }

        let mut removed = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(resource) = self.resources.remove(&id) {
                self.unlink(&id, resource.parent_id.as_ref());
                self.children.remove(&id);
                removed.push(resource);
            }
        }
        if !removed.is_empty() {
            debug!("removed [{}] resources from the tree", removed.len());
        }
        removed
    }

    /// Marks the given resources as confirmed-synced at `time`.
    pub fn set_persisted_time<'a>(&mut self, ids: impl IntoIterator<Item = &'a ID>, time: DateTime<Utc>) {
        for id in ids {
            if let Some(resource) = self.resources.get_mut(id) {
                resource.touch_persisted(time);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
