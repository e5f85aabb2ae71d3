//! EndpointActor - discovery and sync pipeline for one endpoint
//!
//! ## Message Flow
//!
//! ```text
//! Discovery tick → open session → walk type graph → diff tree
//!     → publish InventoryEvent → sync engine (HTTP import/delete)
//! Sampling tick  → read metric attributes → publish MetricEvent
//!     ↑
//!     └─── Commands (DiscoverNow, SampleNow, Shutdown)
//! ```
//!
//! The actor owns the endpoint's `ResourceManager` and `InventorySync`;
//! everything that mutates them runs on this one task, which is the
//! serialization boundary that keeps persisted-time updates race free.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::endpoint::EndpointService;
use crate::inventory::{NodeLocation, ResourceManager};
use crate::sync::{InventorySync, SyncReport};

use super::messages::{EndpointCommand, InventoryEvent, MetricEvent};

/// Scheduling knobs for one endpoint actor.
#[derive(Debug, Clone, Copy)]
pub struct EndpointScheduling {
    pub discovery_interval: Duration,
    pub sample_interval: Duration,
}

impl Default for EndpointScheduling {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(300),
            sample_interval: Duration::from_secs(30),
        }
    }
}

/// Actor running the discovery/sync pipeline of a single endpoint.
pub struct EndpointActor<L: NodeLocation> {
    service: EndpointService<L>,
    manager: ResourceManager<L>,
    sync: Option<InventorySync>,
    scheduling: EndpointScheduling,
    command_rx: mpsc::Receiver<EndpointCommand>,
    event_tx: broadcast::Sender<InventoryEvent<L>>,
    metric_tx: broadcast::Sender<MetricEvent>,
}

impl<L: NodeLocation> EndpointActor<L> {
    pub fn new(
        service: EndpointService<L>,
        sync: Option<InventorySync>,
        scheduling: EndpointScheduling,
        command_rx: mpsc::Receiver<EndpointCommand>,
        event_tx: broadcast::Sender<InventoryEvent<L>>,
        metric_tx: broadcast::Sender<MetricEvent>,
    ) -> Self {
        Self {
            service,
            manager: ResourceManager::new(),
            sync,
            scheduling,
            command_rx,
            event_tx,
            metric_tx,
        }
    }

    /// Run the actor's main loop until a Shutdown command arrives or the
    /// command channel closes.
    #[instrument(skip(self), fields(endpoint = %self.service.endpoint().name))]
    pub async fn run(mut self) {
        debug!("starting endpoint actor");

        let mut discovery_ticker = interval(self.scheduling.discovery_interval);
        let mut sample_ticker = interval(self.scheduling.sample_interval);

        loop {
            tokio::select! {
                _ = discovery_ticker.tick() => {
                    if let Err(e) = self.discover_and_sync().await {
                        error!("discovery cycle failed: {e:#}");
                    }
                }

                _ = sample_ticker.tick() => {
                    if let Err(e) = self.sample().await {
                        error!("sampling pass failed: {e:#}");
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        EndpointCommand::DiscoverNow { respond_to } => {
                            debug!("received DiscoverNow command");
                            let result = self.discover_and_sync().await;
                            let _ = respond_to.send(result);
                        }

                        EndpointCommand::SampleNow { respond_to } => {
                            debug!("received SampleNow command");
                            let result = self.sample().await;
                            let _ = respond_to.send(result);
                        }

                        EndpointCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("endpoint actor stopped");
    }

    /// One full discovery pass followed by a sync cycle.
    ///
    /// A pass that hit subtree errors publishes no event and syncs nothing:
    /// resources that merely failed to answer must not be deleted remotely.
    async fn discover_and_sync(&mut self) -> Result<SyncReport> {
        let session = self.service.open_session().context("failed to open session")?;
        let outcome = self.service.discover_all(&session, &mut self.manager).await;

        if outcome.errors > 0 {
            debug!("[{}] discovery errors occurred - not firing event", outcome.errors);
            return Ok(SyncReport::default());
        }

        let endpoint = self.service.endpoint().name.clone();
        let event = InventoryEvent::Discovery {
            endpoint,
            added: outcome.added.clone(),
            modified: outcome.modified.clone(),
            removed: outcome.removed.clone(),
            full_tree: self.manager.resources_breadth_first().into_iter().cloned().collect(),
            discovered_at: outcome.discovered_at,
        };
        // It is OK if there are no subscribers.
        if self.event_tx.send(event).is_err() {
            trace!("no receivers for inventory event (this is OK)");
        }

        let report = match &mut self.sync {
            Some(sync) => sync
                .sync_discovery(&mut self.manager, self.service.types(), &outcome)
                .await
                .context("inventory sync failed")?,
            None => SyncReport::default(),
        };
        Ok(report)
    }

    /// One metric sampling pass over everything in the tree.
    async fn sample(&mut self) -> Result<usize> {
        if self.manager.is_empty() {
            return Ok(0);
        }
        let session = self.service.open_session().context("failed to open session")?;
        let samples = self.service.sample_all(&session, &self.manager).await;
        let count = samples.len();
        if count > 0 {
            let event = MetricEvent {
                endpoint: self.service.endpoint().name.clone(),
                samples,
                timestamp: Utc::now(),
            };
            if self.metric_tx.send(event).is_err() {
                trace!("no receivers for metric event (this is OK)");
            }
        }
        Ok(count)
    }
}

/// Handle for controlling an [`EndpointActor`].
///
/// Cloneable; can be shared across tasks.
#[derive(Clone)]
pub struct EndpointHandle {
    sender: mpsc::Sender<EndpointCommand>,
    pub endpoint_name: String,
}

impl EndpointHandle {
    /// Spawns the actor as a tokio task and returns a handle to it.
    pub fn spawn<L: NodeLocation>(
        service: EndpointService<L>,
        sync: Option<InventorySync>,
        scheduling: EndpointScheduling,
        event_tx: broadcast::Sender<InventoryEvent<L>>,
        metric_tx: broadcast::Sender<MetricEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let endpoint_name = service.endpoint().name.clone();

        let actor = EndpointActor::new(service, sync, scheduling, cmd_rx, event_tx, metric_tx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            endpoint_name,
        }
    }

    /// Trigger an immediate discovery-and-sync cycle and wait for it.
    pub async fn discover_now(&self) -> Result<SyncReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EndpointCommand::DiscoverNow { respond_to: tx })
            .await
            .context("failed to send DiscoverNow command")?;
        rx.await.context("failed to receive response")?
    }

    /// Trigger an immediate sampling pass; returns the sample count.
    pub async fn sample_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EndpointCommand::SampleNow { respond_to: tx })
            .await
            .context("failed to send SampleNow command")?;
        rx.await.context("failed to receive response")?
    }

    /// Gracefully shut down the actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(EndpointCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
