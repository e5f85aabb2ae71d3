//! The resource type dependency graph

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use super::ids::{ID, Name};
use super::location::NodeLocation;
use super::types::{ResourceType, TypeSet};
use super::{InventoryError, InventoryResult};

/// Holds the graph of resource types.
///
/// Built once from the configured [`TypeSet`]s and immutable afterwards, so
/// it can be shared between any number of concurrent discovery workers
/// without synchronization. The graph itself is never exposed; the manager
/// provides queries over it.
///
/// Multi-parent types are supported: the graph is a DAG held as explicit
/// parent/child adjacency maps. When a type set is disabled its types are
/// absent from the graph, and any type whose every path to an enabled root
/// runs through an absent type is dropped too. A type that still has a live
/// edge from an enabled ancestor stays.
pub struct ResourceTypeManager<L> {
    types: HashMap<ID, ResourceType<L>>,
    children: HashMap<ID, Vec<ID>>,
    parents: HashMap<ID, Vec<ID>>,
    roots: Vec<ID>,
}

impl<L: NodeLocation> ResourceTypeManager<L> {
    /// Builds the graph from the given type sets.
    ///
    /// Only types belonging to enabled sets are collected; `ignored_sets`
    /// optionally excludes whole sets even if they are enabled. Parent
    /// references are resolved against the collected universe: a reference
    /// to an unknown or disabled type is an absent edge, not an error.
    pub fn new(
        type_sets: &BTreeMap<Name, TypeSet<L>>,
        ignored_sets: Option<&HashSet<Name>>,
    ) -> InventoryResult<Self> {
        let mut by_name: HashMap<Name, ID> = HashMap::new();
        let mut types: HashMap<ID, ResourceType<L>> = HashMap::new();
        let mut ordered: Vec<ID> = Vec::new();

        for set in type_sets.values() {
            if !set.enabled {
                debug!("skipping disabled type set [{}]", set.name);
                continue;
            }
            if ignored_sets.is_some_and(|ignored| ignored.contains(&set.name)) {
                debug!("ignoring type set [{}]", set.name);
                continue;
            }
            for resource_type in &set.types {
                if by_name
                    .insert(resource_type.name.clone(), resource_type.id.clone())
                    .is_some()
                {
                    return Err(InventoryError::DuplicateTypeName(resource_type.name.clone()));
                }
                ordered.push(resource_type.id.clone());
                types.insert(resource_type.id.clone(), resource_type.clone());
            }
        }

        let mut children: HashMap<ID, Vec<ID>> = HashMap::new();
        let mut parents: HashMap<ID, Vec<ID>> = HashMap::new();
        let mut roots: Vec<ID> = Vec::new();

        for id in &ordered {
            let resource_type = &types[id];
            if resource_type.parents.is_empty() {
                roots.push(id.clone());
                continue;
            }
            for parent_name in &resource_type.parents {
                match by_name.get(parent_name) {
                    Some(parent_id) => {
                        children.entry(parent_id.clone()).or_default().push(id.clone());
                        parents.entry(id.clone()).or_default().push(parent_id.clone());
                    }
                    None => {
                        debug!("type [{}] will ignore unknown parent [{parent_name}]", resource_type.name);
                    }
                }
            }
        }

        // Types with no remaining path to an enabled root are dropped. A
        // multi-parent type survives as long as one enabled path remains.
        let mut reachable: HashSet<ID> = HashSet::new();
        let mut queue: VecDeque<ID> = roots.iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            if let Some(child_ids) = children.get(&id) {
                queue.extend(child_ids.iter().cloned());
            }
        }

        let unreachable: Vec<ID> = ordered.iter().filter(|id| !reachable.contains(id)).cloned().collect();
        for id in &unreachable {
            info!("dropping type [{id}]: no remaining path to an enabled root");
            types.remove(id);
            children.remove(id);
            parents.remove(id);
        }
        for child_ids in children.values_mut() {
            child_ids.retain(|id| reachable.contains(id));
        }
        for parent_ids in parents.values_mut() {
            parent_ids.retain(|id| reachable.contains(id));
        }

        Ok(Self {
            types,
            children,
            parents,
            roots,
        })
    }

    /// Convenience constructor wrapping loose types into one enabled set.
    pub fn from_types(all_types: impl IntoIterator<Item = ResourceType<L>>) -> InventoryResult<Self> {
        let mut set = TypeSet::new("all", true);
        set.types = all_types.into_iter().collect();
        let mut map = BTreeMap::new();
        map.insert(set.name.clone(), set);
        Self::new(&map, None)
    }

    pub fn get(&self, id: &ID) -> Option<&ResourceType<L>> {
        self.types.get(id)
    }

    /// Types at the top of the hierarchy (declaring no parents).
    pub fn root_types(&self) -> Vec<&ResourceType<L>> {
        self.roots.iter().filter_map(|id| self.types.get(id)).collect()
    }

    /// All enabled types in breadth-first order.
    ///
    /// The traversal uses an explicit queue plus a visited set keyed by type
    /// id, so convergent multi-parent paths are listed once.
    pub fn types_breadth_first(&self) -> Vec<&ResourceType<L>> {
        let mut result = Vec::with_capacity(self.types.len());
        let mut visited: HashSet<&ID> = HashSet::new();
        let mut queue: VecDeque<&ID> = self.roots.iter().collect();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(resource_type) = self.types.get(id) {
                result.push(resource_type);
            }
            if let Some(child_ids) = self.children.get(id) {
                queue.extend(child_ids.iter());
            }
        }
        result
    }

    /// Direct parent types of the given type.
    pub fn parents_of(&self, id: &ID) -> Vec<&ResourceType<L>> {
        self.parents
            .get(id)
            .map(|ids| ids.iter().filter_map(|id| self.types.get(id)).collect())
            .unwrap_or_default()
    }

    /// Direct child types of the given type.
    pub fn children_of(&self, id: &ID) -> Vec<&ResourceType<L>> {
        self.children
            .get(id)
            .map(|ids| ids.iter().filter_map(|id| self.types.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
