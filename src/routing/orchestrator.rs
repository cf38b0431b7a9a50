//! Routing decision orchestrator.
//!
//! Owns the routing table and the active strategy, filters topology
//! notifications into recalculation requests and runs at most one
//! calculation at a time.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use super::calculator::{HyperbolicCalculator, LinkStateCalculator};
use super::schedule::CalculationSchedule;
use super::strategy::{AdaptiveStrategy, LoadAwareCalculator, MlAdaptiveCalculator};
use super::table::{RoutingTable, RoutingTableSnapshot};
use super::topology::{
    AdjacencyTable, LsdbUpdate, LsdbUpdateKind, PathCalculator, TopologyDatabase,
};
use crate::config::{AdaptiveConfig, RoutingConfig};
use crate::linkcost::SharedLinkCostManager;
use crate::types::{AdvertisementType, HyperbolicState, Name, RoutingAlgorithm};
use crate::util::SharedClock;

/// Capacity of the routing change channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Serialises routing table calculations and publishes the results.
pub struct RoutingOrchestrator {
    config: RoutingConfig,
    adaptive: AdaptiveConfig,
    clock: SharedClock,
    lsdb: Arc<dyn TopologyDatabase>,
    link_state: Box<dyn PathCalculator>,
    hyperbolic: Box<dyn PathCalculator>,
    manager: Option<SharedLinkCostManager>,
    schedule: CalculationSchedule,
    table: RoutingTable,
    own_adjacency_exists: bool,
    strategy: Option<AdaptiveStrategy>,
    changes: broadcast::Sender<RoutingTableSnapshot>,
    calculations: u64,
}

impl RoutingOrchestrator {
    /// Orchestrator with the built-in calculators.
    pub fn new(
        config: RoutingConfig,
        adaptive: AdaptiveConfig,
        clock: SharedClock,
        adjacencies: Arc<dyn AdjacencyTable>,
        lsdb: Arc<dyn TopologyDatabase>,
        schedule: CalculationSchedule,
    ) -> Self {
        Self::with_calculators(
            config,
            adaptive,
            clock,
            lsdb,
            Box::new(LinkStateCalculator),
            Box::new(HyperbolicCalculator::new(adjacencies)),
            schedule,
        )
    }

    /// Orchestrator with externally supplied path calculators.
    pub fn with_calculators(
        config: RoutingConfig,
        adaptive: AdaptiveConfig,
        clock: SharedClock,
        lsdb: Arc<dyn TopologyDatabase>,
        link_state: Box<dyn PathCalculator>,
        hyperbolic: Box<dyn PathCalculator>,
        schedule: CalculationSchedule,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let own_adjacency_exists =
            lsdb.has_advertisement(&config.router_name, AdvertisementType::Adjacency);
        Self {
            config,
            adaptive,
            clock,
            lsdb,
            link_state,
            hyperbolic,
            manager: None,
            schedule,
            table: RoutingTable::new(),
            own_adjacency_exists,
            strategy: None,
            changes,
            calculations: 0,
        }
    }

    /// Provide the live cost feed used by the adaptive strategies.
    pub fn set_link_cost_manager(&mut self, manager: SharedLinkCostManager) {
        self.manager = Some(manager);
    }

    pub fn router(&self) -> &Name {
        &self.config.router_name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoutingTableSnapshot> {
        self.changes.subscribe()
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn schedule(&self) -> &CalculationSchedule {
        &self.schedule
    }

    pub fn strategy(&self) -> Option<&AdaptiveStrategy> {
        self.strategy.as_ref()
    }

    pub fn own_adjacency_exists(&self) -> bool {
        self.own_adjacency_exists
    }

    /// Calculations that actually ran.
    pub fn calculation_count(&self) -> u64 {
        self.calculations
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    /// React to a topology database change.
    pub fn on_lsdb_update(&mut self, update: &LsdbUpdate) {
        let own_adjacency = update.origin == self.config.router_name
            && update.advertisement == AdvertisementType::Adjacency;

        if own_adjacency {
            match update.kind {
                LsdbUpdateKind::Removed => {
                    tracing::debug!("Own adjacency advertisement removed, clearing routing table");
                    self.table.clear();
                    self.publish();
                    self.own_adjacency_exists = false;
                }
                LsdbUpdateKind::Installed | LsdbUpdateKind::Updated => {
                    self.own_adjacency_exists = true;
                }
            }
        }

        if update.kind == LsdbUpdateKind::Removed {
            return;
        }
        let hyperbolic = self.config.hyperbolic;
        let relevant = match update.advertisement {
            AdvertisementType::Adjacency => hyperbolic != HyperbolicState::On,
            AdvertisementType::Coordinate => hyperbolic != HyperbolicState::Off,
            AdvertisementType::Name => false,
        };
        if relevant {
            self.schedule_calculation();
        }
    }

    /// Request a calculation after the configured interval.
    pub fn schedule_calculation(&self) {
        self.schedule.request(self.clock.now());
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.schedule.next_deadline()
    }

    /// Run the scheduled calculation if it is due.
    pub fn poll(&mut self) -> bool {
        let now = self.clock.now();
        if !self.schedule.try_begin(now) {
            return false;
        }
        self.calculate();
        self.schedule.finish(self.clock.now());
        true
    }

    // ========================================================================
    // Calculation
    // ========================================================================

    /// Compute the table with the selected strategy.
    ///
    /// Call through [`poll`](Self::poll) to keep calculations single-flight.
    pub fn calculate(&mut self) {
        tracing::trace!("Calculating routing table");

        if self.lsdb.is_adjacency_build_scheduled() {
            tracing::debug!("Adjacency build is scheduled, routing table can not be calculated");
            return;
        }
        self.own_adjacency_exists = self
            .lsdb
            .has_advertisement(&self.config.router_name, AdvertisementType::Adjacency);
        if !self.own_adjacency_exists {
            tracing::debug!("No own adjacency advertisement, routing table can not be calculated");
            self.table.clear();
            self.publish();
            return;
        }
        self.calculations += 1;

        match self.config.algorithm {
            RoutingAlgorithm::MlAdaptive | RoutingAlgorithm::LoadAware => {
                if self.manager.is_none() {
                    tracing::warn!("Link cost manager not available, falling back to standard routing");
                    self.calculate_link_state();
                } else {
                    self.calculate_adaptive();
                }
            }
            RoutingAlgorithm::LinkState => match self.config.hyperbolic {
                HyperbolicState::Off => {
                    tracing::info!("Using standard link-state routing algorithm");
                    self.calculate_link_state();
                }
                HyperbolicState::DryRun => {
                    tracing::info!("Using hyperbolic routing (dry-run mode)");
                    self.calculate_link_state();
                    self.calculate_hyperbolic(true);
                }
                HyperbolicState::On => {
                    tracing::info!("Using hyperbolic routing algorithm");
                    self.calculate_hyperbolic(false);
                }
            },
        }

        self.publish();
    }

    fn calculate_link_state(&mut self) {
        let map = self.lsdb.topology(AdvertisementType::Adjacency);
        let entries = self.link_state.calculate(&self.config.router_name, &map);
        self.table.replace(entries);
    }

    fn calculate_hyperbolic(&mut self, dry_run: bool) {
        let map = self.lsdb.topology(AdvertisementType::Coordinate);
        let entries = self.hyperbolic.calculate(&self.config.router_name, &map);
        if dry_run {
            self.table.replace_dry_run(entries);
        } else {
            self.table.replace(entries);
        }
    }

    fn calculate_adaptive(&mut self) {
        self.ensure_strategy();
        let Some(strategy) = self.strategy.as_ref() else {
            self.calculate_link_state();
            return;
        };
        let map = self.lsdb.topology(AdvertisementType::Adjacency);
        let entries = strategy
            .calculator()
            .calculate(&self.config.router_name, &map);
        self.table.replace(entries);
    }

    /// Create the selected strategy on first use and keep it afterwards.
    fn ensure_strategy(&mut self) {
        let wanted = self.config.algorithm;
        let matches = match (&self.strategy, wanted) {
            (Some(AdaptiveStrategy::MlAdaptive(_)), RoutingAlgorithm::MlAdaptive)
            | (Some(AdaptiveStrategy::LoadAware(_)), RoutingAlgorithm::LoadAware) => true,
            _ => false,
        };
        if matches {
            return;
        }
        let Some(manager) = self.manager.clone() else {
            return;
        };

        self.strategy = match wanted {
            RoutingAlgorithm::MlAdaptive => {
                tracing::info!("Creating persistent ML-adaptive calculator");
                let calculator = MlAdaptiveCalculator::new(
                    Arc::clone(&manager),
                    self.adaptive.clone(),
                    Arc::clone(&self.clock),
                );
                let model = calculator.downgrade();
                manager.lock().set_feedback(Box::new(move |neighbor, performance| {
                    if let Some(model) = model.upgrade() {
                        model.lock().report_path_performance(neighbor, performance);
                    }
                }));
                tracing::info!("Feedback loop established between link costs and the cost model");
                Some(AdaptiveStrategy::MlAdaptive(calculator))
            }
            RoutingAlgorithm::LoadAware => {
                tracing::info!("Creating persistent load-aware calculator");
                Some(AdaptiveStrategy::LoadAware(LoadAwareCalculator::new(
                    manager,
                    Arc::clone(&self.clock),
                )))
            }
            RoutingAlgorithm::LinkState => None,
        };
    }

    fn publish(&self) {
        let snapshot = self.table.snapshot();
        tracing::debug!(entries = snapshot.entries.len(), "Routing table changed");
        // No subscribers is fine.
        let _ = self.changes.send(snapshot);
    }
}

impl Drop for RoutingOrchestrator {
    fn drop(&mut self) {
        if matches!(self.strategy, Some(AdaptiveStrategy::MlAdaptive(_))) {
            if let Some(manager) = &self.manager {
                manager.lock().clear_feedback();
            }
        }
    }
}

impl std::fmt::Debug for RoutingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingOrchestrator")
            .field("router", &self.config.router_name)
            .field("algorithm", &self.config.algorithm)
            .field("hyperbolic", &self.config.hyperbolic)
            .field("own_adjacency_exists", &self.own_adjacency_exists)
            .field("entries", &self.table.len())
            .finish_non_exhaustive()
    }
}
