//! Platform (OS/CPU/memory) snapshot cache
//!
//! One more attribute source for the inventory: the agent's own machine.
//! Readers never block each other; [`PlatformCache::refresh`] builds a new
//! immutable snapshot first and swaps it in under a single short-held write
//! lock, so concurrent getters never observe a half-updated snapshot and
//! never wait longer than the swap itself.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::json;
use sysinfo::System;
use tracing::debug;

use crate::protocol::objname::{LocalRegistry, ObjectName};
use crate::{CpuInformation, CpuOverview, MemoryInformation, PlatformData, SystemInformation};

/// One immutable platform snapshot.
#[derive(Debug, Clone, Default)]
pub struct PlatformSnapshot {
    pub data: PlatformData,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Read-mostly cache of the latest platform snapshot.
#[derive(Default)]
pub struct PlatformCache {
    current: RwLock<Arc<PlatformSnapshot>>,
}

impl PlatformCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest snapshot. Cheap; only an `Arc` clone under a read lock.
    pub fn snapshot(&self) -> Arc<PlatformSnapshot> {
        self.current.read().expect("platform cache lock poisoned").clone()
    }

    /// Collects fresh platform data and swaps it in.
    ///
    /// Collection is blocking (it sleeps for the minimum CPU sampling
    /// interval); call it from a blocking-friendly context. The lock is
    /// only held for the swap.
    pub fn refresh(&self) {
        let snapshot = Arc::new(PlatformSnapshot {
            data: collect(),
            refreshed_at: Some(Utc::now()),
        });
        *self.current.write().expect("platform cache lock poisoned") = snapshot;
        debug!("platform snapshot refreshed");
    }

    /// Publishes the current snapshot as object-name attributes, making the
    /// platform discoverable through the in-process object-name driver.
    pub fn publish(&self, registry: &LocalRegistry) {
        let snapshot = self.snapshot();

        let os = ObjectName::parse("platform:type=operating-system").expect("static object name");
        registry.register(
            os,
            BTreeMap::from([
                (String::from("name"), json!(snapshot.data.system.name)),
                (String::from("kernel-version"), json!(snapshot.data.system.kernel_version)),
                (String::from("os-version"), json!(snapshot.data.system.os_version)),
                (String::from("host-name"), json!(snapshot.data.system.host_name)),
            ]),
        );

        let memory = ObjectName::parse("platform:type=memory").expect("static object name");
        registry.register(
            memory,
            BTreeMap::from([(
                String::from("usage"),
                json!({
                    "total": snapshot.data.memory.total,
                    "used": snapshot.data.memory.used,
                    "total-swap": snapshot.data.memory.total_swap,
                    "used-swap": snapshot.data.memory.used_swap,
                }),
            )]),
        );

        let cpu = ObjectName::parse("platform:type=cpu").expect("static object name");
        registry.register(
            cpu,
            BTreeMap::from([
                (String::from("count"), json!(snapshot.data.cpus.total)),
                (String::from("arch"), json!(snapshot.data.cpus.arch)),
                (String::from("average-usage"), json!(snapshot.data.cpus.average_usage)),
            ]),
        );
    }
}

/// Collects one platform snapshot via sysinfo. Blocking.
pub fn collect() -> PlatformData {
    let mut sys = System::new_all();
    sys.refresh_all();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_all();

    let cpus = sys.cpus();

    PlatformData {
        system: SystemInformation {
            name: System::name(),
            kernel_version: System::kernel_version(),
            os_version: System::os_version(),
            host_name: System::host_name(),
        },
        memory: MemoryInformation {
            total: sys.total_memory(),
            used: sys.used_memory(),
            total_swap: sys.total_swap(),
            used_swap: sys.used_swap(),
        },
        cpus: {
            let total_cpus = cpus.len() as f32;
            let cpu_usage_sum = cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>();

            CpuOverview {
                total: cpus.len(),
                arch: System::cpu_arch(),
                average_usage: if cpus.is_empty() { 0.0 } else { cpu_usage_sum / total_cpus },
                cpus: cpus
                    .iter()
                    .map(|cpu| CpuInformation {
                        name: cpu.name().to_string(),
                        frequency: cpu.frequency(),
                        usage: cpu.cpu_usage(),
                    })
                    .collect(),
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::objname::ManagedRegistry;

    #[test]
    fn test_snapshot_starts_empty_until_refresh() {
        let cache = PlatformCache::new();
        assert!(cache.snapshot().refreshed_at.is_none());
    }

    #[test]
    fn test_publish_registers_platform_objects() {
        let cache = PlatformCache::new();
        let registry = LocalRegistry::new();
        cache.publish(&registry);

        let names = registry.query_names(&ObjectName::parse("platform:*").unwrap());
        assert_eq!(names.len(), 3);

        let memory = ObjectName::parse("platform:type=memory").unwrap();
        let usage = registry.get_attribute(&memory, "usage").unwrap();
        assert!(usage.get("total").is_some());
    }
}
