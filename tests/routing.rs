//! Routing orchestration and cost-aware strategies.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{deterministic_config, name, Fixture};
use svarog::adaptive::{AdaptiveCostModel, FeatureVector};
use svarog::config::{AdaptiveConfig, RoutingConfig};
use svarog::linkcost::SharedLinkCostManager;
use svarog::routing::{
    AdaptiveStrategy, AdjacencyTable, CalculationSchedule, Coordinate, InMemoryAdjacencyTable,
    InMemoryTopologyDatabase, LinkStateCalculator, LsdbUpdate, LsdbUpdateKind, PathCalculator,
    RoutingOrchestrator, RoutingTableEntry, TopologyDatabase, TopologyMap,
};
use svarog::types::{AdvertisementType, HyperbolicState, Name, RoutingAlgorithm};
use svarog::util::{ManualClock, SharedClock};

const MS_50: Duration = Duration::from_millis(50);
const INTERVAL: Duration = Duration::from_secs(15);

fn routing_config(algorithm: RoutingAlgorithm, hyperbolic: HyperbolicState) -> RoutingConfig {
    RoutingConfig {
        router_name: name("/ndn/a"),
        algorithm,
        hyperbolic,
        calculation_interval: INTERVAL,
    }
}

/// Three routers in a line: a - b - c.
fn install_line(lsdb: &InMemoryTopologyDatabase) -> Vec<LsdbUpdate> {
    vec![
        lsdb.install_adjacency(name("/ndn/a"), vec![(name("/ndn/b"), 10.0)]),
        lsdb.install_adjacency(
            name("/ndn/b"),
            vec![(name("/ndn/a"), 10.0), (name("/ndn/c"), 5.0)],
        ),
        lsdb.install_adjacency(name("/ndn/c"), vec![(name("/ndn/b"), 5.0)]),
    ]
}

fn orchestrator_for(fx: &Fixture, config: RoutingConfig) -> RoutingOrchestrator {
    let clock: SharedClock = fx.clock.clone();
    RoutingOrchestrator::new(
        config,
        AdaptiveConfig::default(),
        clock,
        fx.adjacencies.clone(),
        fx.lsdb.clone(),
        fx.schedule.clone(),
    )
}

fn shared(fx: Fixture) -> (SharedLinkCostManager, FixtureParts) {
    let parts = FixtureParts {
        clock: fx.clock.clone(),
        adjacencies: fx.adjacencies.clone(),
        lsdb: fx.lsdb.clone(),
        schedule: fx.schedule.clone(),
    };
    (fx.manager.into_shared(), parts)
}

struct FixtureParts {
    clock: Arc<ManualClock>,
    adjacencies: Arc<InMemoryAdjacencyTable>,
    lsdb: Arc<InMemoryTopologyDatabase>,
    schedule: CalculationSchedule,
}

impl FixtureParts {
    fn orchestrator(&self, config: RoutingConfig) -> RoutingOrchestrator {
        let clock: SharedClock = self.clock.clone();
        RoutingOrchestrator::new(
            config,
            AdaptiveConfig::default(),
            clock,
            self.adjacencies.clone(),
            self.lsdb.clone(),
            self.schedule.clone(),
        )
    }
}

/// Probe `neighbor` through the shared manager.
fn sample(manager: &SharedLinkCostManager, clock: &ManualClock, neighbor: &Name, rtt: Duration) {
    let mut manager = manager.lock();
    let seq = manager.send_probe(neighbor).expect("probe expressed");
    clock.advance(rtt);
    manager.handle_rtt_response(neighbor, seq);
}

// ============================================================================
// Single-flight Scheduling
// ============================================================================

/// Calculator that fires extra recalculation requests while it runs.
struct ReentrantCalculator {
    schedule: CalculationSchedule,
    clock: Arc<ManualClock>,
    calls: Arc<AtomicUsize>,
}

impl PathCalculator for ReentrantCalculator {
    fn calculate(&self, source: &Name, map: &TopologyMap) -> Vec<RoutingTableEntry> {
        use svarog::util::Clock;
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.schedule.request(self.clock.now());
            self.schedule.request(self.clock.now());
        }
        LinkStateCalculator.calculate(source, map)
    }
}

#[test]
fn test_triggers_during_calculation_run_exactly_once_more() {
    let clock = ManualClock::shared(0);
    let lsdb = Arc::new(InMemoryTopologyDatabase::new());
    let schedule = CalculationSchedule::new(INTERVAL);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut orchestrator = RoutingOrchestrator::with_calculators(
        routing_config(RoutingAlgorithm::LinkState, HyperbolicState::Off),
        AdaptiveConfig::default(),
        clock.clone(),
        lsdb.clone(),
        Box::new(ReentrantCalculator {
            schedule: schedule.clone(),
            clock: clock.clone(),
            calls: calls.clone(),
        }),
        Box::new(LinkStateCalculator),
        schedule.clone(),
    );

    for update in install_line(&lsdb) {
        orchestrator.on_lsdb_update(&update);
    }

    clock.advance(INTERVAL);
    assert!(orchestrator.poll());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(schedule.is_scheduled(), "deferred recalculation armed");

    // not yet due
    assert!(!orchestrator.poll());

    clock.advance(INTERVAL);
    assert!(orchestrator.poll());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    clock.advance(INTERVAL * 4);
    assert!(!orchestrator.poll());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Topology Notifications
// ============================================================================

#[test]
fn test_own_advertisement_lifecycle() {
    let fx = Fixture::new(deterministic_config(), &[("/ndn/b", 10.0)]);
    let mut orchestrator =
        orchestrator_for(&fx, routing_config(RoutingAlgorithm::LinkState, HyperbolicState::Off));
    let mut changes = orchestrator.subscribe();

    // without its own advertisement nothing can be computed
    fx.lsdb.install_adjacency(name("/ndn/b"), vec![(name("/ndn/a"), 10.0)]);
    orchestrator.schedule_calculation();
    fx.clock.advance(INTERVAL);
    assert!(orchestrator.poll());
    assert!(changes.try_recv().unwrap().is_empty());
    assert_eq!(orchestrator.calculation_count(), 0);

    for update in install_line(&fx.lsdb) {
        orchestrator.on_lsdb_update(&update);
    }
    assert!(orchestrator.own_adjacency_exists());
    fx.clock.advance(INTERVAL);
    assert!(orchestrator.poll());

    let snapshot = changes.try_recv().unwrap();
    let to_c = snapshot.entry(&name("/ndn/c")).unwrap();
    assert_eq!(to_c.best().unwrap().neighbor, name("/ndn/b"));
    assert!((to_c.best().unwrap().cost - 15.0).abs() < 1e-9);

    let removed = fx
        .lsdb
        .remove(&name("/ndn/a"), AdvertisementType::Adjacency)
        .unwrap();
    orchestrator.on_lsdb_update(&removed);
    assert!(!orchestrator.own_adjacency_exists());
    assert!(orchestrator.table().is_empty());
    assert!(changes.try_recv().unwrap().is_empty());
}

#[test]
fn test_hyperbolic_dry_run_fills_both_tables() {
    let fx = Fixture::new(deterministic_config(), &[("/ndn/b", 10.0)]);
    let mut orchestrator =
        orchestrator_for(&fx, routing_config(RoutingAlgorithm::LinkState, HyperbolicState::DryRun));

    for update in install_line(&fx.lsdb) {
        orchestrator.on_lsdb_update(&update);
    }
    for (router, angle) in [("/ndn/a", 0.0), ("/ndn/b", 0.5), ("/ndn/c", 1.0)] {
        let update = fx.lsdb.install_coordinate(
            name(router),
            Coordinate {
                radius: 2.0,
                angles: vec![angle],
            },
        );
        orchestrator.on_lsdb_update(&update);
    }

    fx.clock.advance(INTERVAL);
    assert!(orchestrator.poll());

    let snapshot = orchestrator.table().snapshot();
    assert_eq!(snapshot.entries.len(), 2);
    assert_eq!(snapshot.dry_run.len(), 2);
    assert!(snapshot.dry_run.iter().all(|e| e.best().unwrap().neighbor == name("/ndn/b")));
}

#[test]
fn test_hyperbolic_on_uses_coordinates_only() {
    let fx = Fixture::new(deterministic_config(), &[("/ndn/b", 10.0)]);
    let mut orchestrator =
        orchestrator_for(&fx, routing_config(RoutingAlgorithm::LinkState, HyperbolicState::On));

    for update in install_line(&fx.lsdb) {
        orchestrator.on_lsdb_update(&update);
    }
    // adjacency notifications do not schedule in this mode
    assert!(orchestrator.next_deadline().is_none());

    for (router, angle) in [("/ndn/b", 0.5), ("/ndn/c", 1.0)] {
        let update = fx.lsdb.install_coordinate(
            name(router),
            Coordinate {
                radius: 2.0,
                angles: vec![angle],
            },
        );
        orchestrator.on_lsdb_update(&update);
    }
    fx.clock.advance(INTERVAL);
    assert!(orchestrator.poll());

    let snapshot = orchestrator.table().snapshot();
    assert_eq!(snapshot.entries.len(), 2);
    assert!(snapshot.dry_run.is_empty());
}

#[test]
fn test_build_in_progress_blocks_calculation() {
    let fx = Fixture::new(deterministic_config(), &[("/ndn/b", 10.0)]);
    let mut orchestrator =
        orchestrator_for(&fx, routing_config(RoutingAlgorithm::LinkState, HyperbolicState::Off));
    let mut changes = orchestrator.subscribe();

    for update in install_line(&fx.lsdb) {
        orchestrator.on_lsdb_update(&update);
    }
    fx.lsdb.schedule_adjacency_build();
    fx.clock.advance(INTERVAL);
    assert!(orchestrator.poll());
    assert!(changes.try_recv().is_err(), "no notification for a skipped calculation");
    assert!(orchestrator.table().is_empty());
}

// ============================================================================
// Strategy Selection
// ============================================================================

#[test]
fn test_adaptive_without_manager_falls_back() {
    for algorithm in [RoutingAlgorithm::MlAdaptive, RoutingAlgorithm::LoadAware] {
        let fx = Fixture::new(deterministic_config(), &[("/ndn/b", 10.0)]);
        let mut orchestrator = orchestrator_for(&fx, routing_config(algorithm, HyperbolicState::Off));
        for update in install_line(&fx.lsdb) {
            orchestrator.on_lsdb_update(&update);
        }
        fx.clock.advance(INTERVAL);
        assert!(orchestrator.poll());

        assert!(orchestrator.strategy().is_none());
        assert_eq!(orchestrator.table().len(), 2);
    }
}

#[test]
fn test_ml_strategy_created_once_and_wired() {
    let fx = Fixture::new(deterministic_config(), &[("/ndn/b", 10.0)]);
    let (manager, parts) = shared(fx);
    let mut orchestrator =
        parts.orchestrator(routing_config(RoutingAlgorithm::MlAdaptive, HyperbolicState::On));
    orchestrator.set_link_cost_manager(manager.clone());

    for update in install_line(&parts.lsdb) {
        orchestrator.on_lsdb_update(&update);
    }
    // adjacency notifications are filtered out with hyperbolic routing on
    assert!(orchestrator.next_deadline().is_none());
    orchestrator.schedule_calculation();
    parts.clock.advance(INTERVAL);
    assert!(orchestrator.poll());

    // ML wins over every other setting
    assert!(matches!(orchestrator.strategy(), Some(AdaptiveStrategy::MlAdaptive(_))));
    assert_eq!(orchestrator.table().len(), 2);
    {
        let manager = manager.lock();
        assert!(manager.has_cost_transform());
        assert!(manager.has_feedback());
    }

    let model = match orchestrator.strategy() {
        Some(AdaptiveStrategy::MlAdaptive(calculator)) => Arc::clone(calculator.model()),
        _ => unreachable!(),
    };

    orchestrator.schedule_calculation();
    parts.clock.advance(INTERVAL);
    assert!(orchestrator.poll());
    match orchestrator.strategy() {
        Some(AdaptiveStrategy::MlAdaptive(calculator)) => {
            assert!(Arc::ptr_eq(calculator.model(), &model), "strategy kept across calculations");
        }
        _ => unreachable!(),
    }

    drop(orchestrator);
    let manager = manager.lock();
    assert!(!manager.has_cost_transform());
    assert!(!manager.has_feedback());
}

#[test]
fn test_untrained_model_drives_costs() {
    let fx = Fixture::new(deterministic_config(), &[("/ndn/b", 10.0)]);
    let (manager, parts) = shared(fx);
    let mut orchestrator =
        parts.orchestrator(routing_config(RoutingAlgorithm::MlAdaptive, HyperbolicState::Off));
    orchestrator.set_link_cost_manager(manager.clone());
    for update in install_line(&parts.lsdb) {
        orchestrator.on_lsdb_update(&update);
    }
    parts.clock.advance(INTERVAL);
    assert!(orchestrator.poll());

    let b = name("/ndn/b");
    for _ in 0..3 {
        sample(&manager, &parts.clock, &b, MS_50);
    }

    // empty mirror: only the default success rate contributes, 0.2 * 0.5
    let fallback = AdaptiveCostModel::new(AdaptiveConfig::default(), parts.clock.clone())
        .score(&FeatureVector::extract(&[], 500.0, 0.5));
    assert!((fallback - 0.1).abs() < 1e-12);
    let expected = 10.0 * (1.0 + fallback);
    let cost = manager.lock().current_cost(&b).unwrap();
    assert!((cost - expected).abs() < 1e-9);
    assert!((parts.adjacencies.link_cost(&b).unwrap() - expected).abs() < 1e-9);
}

#[test]
fn test_feedback_reaches_model() {
    let fx = Fixture::new(deterministic_config(), &[("/ndn/b", 10.0)]);
    let (manager, parts) = shared(fx);
    let mut orchestrator =
        parts.orchestrator(routing_config(RoutingAlgorithm::MlAdaptive, HyperbolicState::Off));
    orchestrator.set_link_cost_manager(manager.clone());
    for update in install_line(&parts.lsdb) {
        orchestrator.on_lsdb_update(&update);
    }
    parts.clock.advance(INTERVAL);
    assert!(orchestrator.poll());

    let b = name("/ndn/b");
    for _ in 0..8 {
        sample(&manager, &parts.clock, &b, MS_50);
    }

    let model = match orchestrator.strategy() {
        Some(AdaptiveStrategy::MlAdaptive(calculator)) => Arc::clone(calculator.model()),
        _ => unreachable!(),
    };
    let model = model.lock();
    let stats = model.statistics();
    assert_eq!(stats.pattern_update_count, 4);
    assert_eq!(model.performance_history(&b).len(), 4);
    assert!(stats.prediction_count >= 1);
    assert!(model.patterns().slot(&b, parts.clock_minute()).is_some());
}

#[test]
fn test_load_aware_strategy_transforms_costs() {
    let fx = Fixture::new(deterministic_config(), &[("/ndn/b", 10.0)]);
    let (manager, parts) = shared(fx);
    let mut orchestrator =
        parts.orchestrator(routing_config(RoutingAlgorithm::LoadAware, HyperbolicState::Off));
    orchestrator.set_link_cost_manager(manager.clone());
    for update in install_line(&parts.lsdb) {
        orchestrator.on_lsdb_update(&update);
    }
    parts.clock.advance(INTERVAL);
    assert!(orchestrator.poll());
    assert!(matches!(orchestrator.strategy(), Some(AdaptiveStrategy::LoadAware(_))));
    assert!(!manager.lock().has_feedback());

    let b = name("/ndn/b");
    for _ in 0..3 {
        sample(&manager, &parts.clock, &b, MS_50);
    }
    let expected = 10.0 * (1.0 + 0.3 * 1.5f64.ln());
    let cost = manager.lock().current_cost(&b).unwrap();
    assert!((cost - expected).abs() < 1e-9);

    let last = match orchestrator.strategy() {
        Some(AdaptiveStrategy::LoadAware(calculator)) => calculator.last_cost(&b),
        _ => None,
    };
    assert_eq!(last, Some(cost));
}

impl FixtureParts {
    fn clock_minute(&self) -> u32 {
        use svarog::util::Clock;
        self.clock.minute_of_day()
    }
}

#[test]
fn test_topology_update_kinds() {
    let lsdb = InMemoryTopologyDatabase::new();
    let first = lsdb.install_adjacency(name("/ndn/a"), vec![]);
    let second = lsdb.install_adjacency(name("/ndn/a"), vec![(name("/ndn/b"), 1.0)]);
    assert_eq!(
        (first.kind, second.kind),
        (LsdbUpdateKind::Installed, LsdbUpdateKind::Updated)
    );
    assert_eq!(
        second,
        LsdbUpdate {
            kind: LsdbUpdateKind::Updated,
            advertisement: AdvertisementType::Adjacency,
            origin: name("/ndn/a"),
        }
    );
}
