//! Event loop driving link cost estimation and routing decisions.
//!
//! All state machines run on the single task executing
//! [`RoutingDaemon::run`]: it sleeps until the earliest timer, wakes early
//! for probe outcomes, hello notifications and topology changes, and handles
//! each one to completion before taking the next.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};

use crate::error::Result;
use crate::linkcost::{NeighborEvent, SharedLinkCostManager};
use crate::probe::ProbeOutcome;
use crate::routing::{LsdbUpdate, RoutingOrchestrator};

/// Inputs consumed by the daemon loop.
#[derive(Debug)]
pub struct DaemonChannels {
    pub outcomes: mpsc::UnboundedReceiver<ProbeOutcome>,
    pub neighbor_events: mpsc::UnboundedReceiver<NeighborEvent>,
    pub lsdb_updates: broadcast::Receiver<LsdbUpdate>,
}

/// Single-task driver for a link cost manager and a routing orchestrator.
#[derive(Debug)]
pub struct RoutingDaemon {
    manager: SharedLinkCostManager,
    orchestrator: RoutingOrchestrator,
    channels: DaemonChannels,
}

impl RoutingDaemon {
    /// Wire the orchestrator to the manager's cost feed.
    pub fn new(
        manager: SharedLinkCostManager,
        mut orchestrator: RoutingOrchestrator,
        channels: DaemonChannels,
    ) -> Self {
        orchestrator.set_link_cost_manager(Arc::clone(&manager));
        Self {
            manager,
            orchestrator,
            channels,
        }
    }

    pub fn manager(&self) -> &SharedLinkCostManager {
        &self.manager
    }

    pub fn orchestrator(&self) -> &RoutingOrchestrator {
        &self.orchestrator
    }

    /// Run until `shutdown` fires, then stop the manager (restoring costs).
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        {
            let mut manager = self.manager.lock();
            if !manager.is_active() {
                manager.start();
            }
        }
        tracing::info!(router = %self.orchestrator.router(), "Routing daemon started");

        let mut lsdb_open = true;
        loop {
            self.drive_timers();
            let deadline = self.next_deadline();

            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Routing daemon shutting down");
                    break;
                }

                Some(outcome) = self.channels.outcomes.recv() => {
                    self.manager.lock().on_probe_outcome(&outcome);
                }

                Some(event) = self.channels.neighbor_events.recv() => {
                    self.manager.lock().on_neighbor_event(&event);
                }

                update = self.channels.lsdb_updates.recv(), if lsdb_open => {
                    match update {
                        Ok(update) => self.orchestrator.on_lsdb_update(&update),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "Topology notifications lagged, recalculating");
                            self.orchestrator.schedule_calculation();
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::warn!("Topology notification channel closed");
                            lsdb_open = false;
                        }
                    }
                }

                () = sleep_until(deadline) => {}
            }
        }

        self.manager.lock().stop();
        tracing::info!("Routing daemon stopped");
        Ok(())
    }

    fn drive_timers(&mut self) {
        self.manager.lock().poll_timers();
        self.orchestrator.poll();
    }

    fn next_deadline(&mut self) -> Option<Instant> {
        let manager = self.manager.lock().next_deadline();
        match (manager, self.orchestrator.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Fire `shutdown` on the first Ctrl-C (SIGINT).
pub fn shutdown_on_ctrl_c(shutdown: broadcast::Sender<()>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
                let _ = shutdown.send(());
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for SIGINT"),
        }
    })
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending::<()>().await,
    }
}
