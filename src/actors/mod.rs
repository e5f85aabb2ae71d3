//! Actor layer of the agent
//!
//! Each monitored endpoint gets one actor running as an independent tokio
//! task. That task owns the endpoint's resource tree and sync engine, so
//! discovery and sync for one endpoint are serialized by construction while
//! different endpoints run concurrently, each with its own driver
//! connection, resolver and tree.
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control
//!    messages (discover now, sample now, shutdown)
//! 2. **Events**: inventory and metric events are published to broadcast
//!    channels for fan-out to any number of subscribers
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod endpoint;
pub mod messages;

pub use endpoint::{EndpointActor, EndpointHandle, EndpointScheduling};
pub use messages::{EndpointCommand, InventoryEvent, MetricEvent};
