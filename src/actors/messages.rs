//! Message types for actor communication

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::endpoint::MetricSample;
use crate::inventory::Resource;
use crate::sync::SyncReport;

/// The unit of communication from the discovery engine to inventory
/// listeners.
///
/// Broadcast to all subscribers; the channel may lag or drop events for
/// slow subscribers, which is acceptable because every full discovery
/// carries complete state.
#[derive(Debug, Clone)]
pub enum InventoryEvent<L> {
    /// A full discovery pass finished without errors.
    Discovery {
        endpoint: String,
        added: Vec<Resource<L>>,
        modified: Vec<Resource<L>>,
        removed: Vec<Resource<L>>,
        /// Snapshot of the whole tree in breadth-first order
        full_tree: Vec<Resource<L>>,
        discovered_at: DateTime<Utc>,
    },

    /// Incremental update outside a full scan.
    AddedOrModified {
        endpoint: String,
        resources: Vec<Resource<L>>,
    },

    /// Incremental removal outside a full scan.
    Removed {
        endpoint: String,
        resources: Vec<Resource<L>>,
    },
}

/// Event published after a metric sampling pass.
#[derive(Debug, Clone)]
pub struct MetricEvent {
    pub endpoint: String,
    pub samples: Vec<MetricSample>,
    pub timestamp: DateTime<Utc>,
}

/// Commands that can be sent to an endpoint actor
#[derive(Debug)]
pub enum EndpointCommand {
    /// Run a discovery-and-sync cycle immediately, bypassing the ticker.
    DiscoverNow {
        respond_to: oneshot::Sender<anyhow::Result<SyncReport>>,
    },

    /// Run a metric sampling pass immediately.
    SampleNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    /// Gracefully shut down the actor.
    ///
    /// An in-flight cycle finishes; nothing new is started.
    Shutdown,
}
