pub mod actors;
pub mod config;
pub mod endpoint;
pub mod inventory;
pub mod platform;
pub mod protocol;
pub mod sync;
pub mod util;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformData {
    pub system: SystemInformation,
    pub memory: MemoryInformation,
    pub cpus: CpuOverview,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemInformation {
    pub name: Option<String>,
    pub kernel_version: Option<String>,
    pub os_version: Option<String>,
    pub host_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryInformation {
    pub total: u64,
    pub used: u64,
    pub total_swap: u64,
    pub used_swap: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuOverview {
    pub total: usize,
    pub arch: String,
    pub average_usage: f32,
    pub cpus: Vec<CpuInformation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuInformation {
    pub name: String,
    pub frequency: u64,
    pub usage: f32,
}
