//! Cost-aware routing strategies.
//!
//! Both strategies keep the shortest-path algorithm unchanged and act on the
//! link costs instead: on construction they install a cost transform in the
//! link cost manager, and remove it again when dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::calculator::LinkStateCalculator;
use super::table::RoutingTableEntry;
use super::topology::{PathCalculator, TopologyMap};
use crate::adaptive::{AdaptiveCostModel, SharedCostModel};
use crate::config::AdaptiveConfig;
use crate::linkcost::{LinkMetrics, SharedLinkCostManager};
use crate::types::Name;
use crate::util::{coefficient_of_variation, whole_millis, SharedClock};

const RTT_WEIGHT: f64 = 0.3;
const LOAD_WEIGHT: f64 = 0.4;
const STABILITY_WEIGHT: f64 = 0.3;

/// RTT samples kept per neighbor by the load-aware transform.
pub const LOAD_AWARE_HISTORY: usize = 10;
/// Relative change below which the previous transformed cost is kept.
pub const MIN_COST_CHANGE_RATIO: f64 = 0.05;
/// Minimum spacing between transformed-cost changes for one neighbor.
pub const MIN_UPDATE_SPACING: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct CostRecord {
    cost: f64,
    at: Instant,
}

/// Per-neighbor state of the load-aware transform.
struct LoadAwareState {
    clock: SharedClock,
    max_multiplier: f64,
    rtts: HashMap<Name, VecDeque<f64>>,
    last: HashMap<Name, CostRecord>,
}

impl std::fmt::Debug for LoadAwareState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadAwareState")
            .field("max_multiplier", &self.max_multiplier)
            .field("neighbors", &self.rtts.len())
            .finish_non_exhaustive()
    }
}

impl LoadAwareState {
    fn transform(&mut self, neighbor: &Name, rtt_cost: f64, metrics: &LinkMetrics) -> f64 {
        let Some(rtt) = metrics.current_rtt else {
            return rtt_cost;
        };
        let rtt_ms = whole_millis(rtt);
        let history = self.rtts.entry(neighbor.clone()).or_default();
        history.push_back(rtt_ms);
        while history.len() > LOAD_AWARE_HISTORY {
            history.pop_front();
        }
        let samples: Vec<f64> = history.iter().copied().collect();

        let rtt_factor = (1.0 + rtt_ms / 100.0).ln();
        let load_factor = load_factor(&samples);
        let stability_factor = coefficient_of_variation(&samples).map_or(0.0, |cv| cv.min(1.0));

        let multiplier = 1.0
            + RTT_WEIGHT * rtt_factor
            + LOAD_WEIGHT * load_factor
            + STABILITY_WEIGHT * stability_factor;
        let cost = (metrics.original_cost * multiplier)
            .min(metrics.original_cost * self.max_multiplier);

        let now = self.clock.now();
        if let Some(previous) = self.last.get(neighbor) {
            let small = previous.cost > 0.0
                && (cost - previous.cost).abs() / previous.cost < MIN_COST_CHANGE_RATIO;
            let recent = now.saturating_duration_since(previous.at) < MIN_UPDATE_SPACING;
            if small || recent {
                tracing::trace!(
                    neighbor = %neighbor,
                    cost,
                    kept = previous.cost,
                    "Load-aware cost change suppressed"
                );
                return previous.cost;
            }
        }
        self.last.insert(neighbor.clone(), CostRecord { cost, at: now });

        tracing::debug!(
            neighbor = %neighbor,
            rtt_factor,
            load_factor,
            stability_factor,
            cost,
            "Load-aware cost"
        );
        cost
    }
}

/// How far the latest sample sits above the mean of the earlier ones, in `[0, 1]`.
fn load_factor(samples: &[f64]) -> f64 {
    let Some((latest, earlier)) = samples.split_last() else {
        return 0.0;
    };
    if earlier.len() < 2 {
        return 0.0;
    }
    let baseline = earlier.iter().sum::<f64>() / earlier.len() as f64;
    if baseline <= 0.0 {
        return 0.0;
    }
    ((latest - baseline) / baseline).clamp(0.0, 1.0)
}

/// Link-state routing over costs that account for load and jitter.
pub struct LoadAwareCalculator {
    manager: SharedLinkCostManager,
    state: Arc<Mutex<LoadAwareState>>,
    link_state: LinkStateCalculator,
}

impl LoadAwareCalculator {
    pub fn new(manager: SharedLinkCostManager, clock: SharedClock) -> Self {
        let mut guard = manager.lock();
        let state = Arc::new(Mutex::new(LoadAwareState {
            clock,
            max_multiplier: guard.config().max_cost_multiplier,
            rtts: HashMap::new(),
            last: HashMap::new(),
        }));
        let hook_state = Arc::clone(&state);
        guard.set_cost_transform(Box::new(move |neighbor, rtt_cost, metrics| {
            Ok(hook_state.lock().transform(neighbor, rtt_cost, metrics))
        }));
        drop(guard);

        tracing::info!("Load-aware routing calculator created");
        Self {
            manager,
            state,
            link_state: LinkStateCalculator,
        }
    }

    /// Last cost produced for `neighbor`.
    pub fn last_cost(&self, neighbor: &Name) -> Option<f64> {
        self.state.lock().last.get(neighbor).map(|record| record.cost)
    }
}

impl PathCalculator for LoadAwareCalculator {
    fn calculate(&self, source: &Name, map: &TopologyMap) -> Vec<RoutingTableEntry> {
        let entries = self.link_state.calculate(source, map);
        tracing::debug!(destinations = entries.len(), "Load-aware routing calculation completed");
        entries
    }
}

impl Drop for LoadAwareCalculator {
    fn drop(&mut self) {
        self.manager.lock().clear_cost_transform();
    }
}

impl std::fmt::Debug for LoadAwareCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadAwareCalculator").finish_non_exhaustive()
    }
}

/// Link-state routing over costs predicted by the adaptive model.
pub struct MlAdaptiveCalculator {
    manager: SharedLinkCostManager,
    model: SharedCostModel,
    link_state: LinkStateCalculator,
}

impl MlAdaptiveCalculator {
    pub fn new(manager: SharedLinkCostManager, config: AdaptiveConfig, clock: SharedClock) -> Self {
        let model = AdaptiveCostModel::new(config, clock).into_shared();
        let weak = Arc::downgrade(&model);
        manager
            .lock()
            .set_cost_transform(Box::new(move |neighbor, _rtt_cost, metrics| {
                let model = weak
                    .upgrade()
                    .ok_or_else(|| anyhow::anyhow!("adaptive cost model dropped"))?;
                let cost = model.lock().predict_link_cost(neighbor, metrics);
                Ok(cost)
            }));

        tracing::info!("ML-adaptive routing calculator created");
        Self {
            manager,
            model,
            link_state: LinkStateCalculator,
        }
    }

    pub fn model(&self) -> &SharedCostModel {
        &self.model
    }

    /// Weak handle for hooks that must not keep the model alive.
    pub fn downgrade(&self) -> Weak<Mutex<AdaptiveCostModel>> {
        Arc::downgrade(&self.model)
    }

    pub fn report_path_performance(&self, neighbor: &Name, performance: f64) {
        self.model.lock().report_path_performance(neighbor, performance);
    }
}

impl PathCalculator for MlAdaptiveCalculator {
    fn calculate(&self, source: &Name, map: &TopologyMap) -> Vec<RoutingTableEntry> {
        let entries = self.link_state.calculate(source, map);
        tracing::debug!(
            destinations = entries.len(),
            predictions = self.model.lock().statistics().prediction_count,
            "ML-adaptive routing calculation completed"
        );
        entries
    }
}

impl Drop for MlAdaptiveCalculator {
    fn drop(&mut self) {
        self.manager.lock().clear_cost_transform();
    }
}

impl std::fmt::Debug for MlAdaptiveCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlAdaptiveCalculator")
            .field("model", &*self.model.lock())
            .finish_non_exhaustive()
    }
}

/// The cost-aware strategy held by the orchestrator once created.
#[derive(Debug)]
pub enum AdaptiveStrategy {
    LoadAware(LoadAwareCalculator),
    MlAdaptive(MlAdaptiveCalculator),
}

impl AdaptiveStrategy {
    pub fn calculator(&self) -> &dyn PathCalculator {
        match self {
            AdaptiveStrategy::LoadAware(calculator) => calculator,
            AdaptiveStrategy::MlAdaptive(calculator) => calculator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinkStatus;
    use crate::util::ManualClock;

    fn metrics(rtt_ms: u64) -> LinkMetrics {
        LinkMetrics {
            neighbor: Name::from("/b"),
            status: LinkStatus::Active,
            original_cost: 10.0,
            current_cost: 10.0,
            timeout_count: 0,
            last_success: Instant::now(),
            rtt_history: vec![],
            current_rtt: Some(Duration::from_millis(rtt_ms)),
        }
    }

    fn state(clock: SharedClock) -> LoadAwareState {
        LoadAwareState {
            clock,
            max_multiplier: 5.0,
            rtts: HashMap::new(),
            last: HashMap::new(),
        }
    }

    #[test]
    fn test_load_factor() {
        assert_eq!(load_factor(&[]), 0.0);
        assert_eq!(load_factor(&[10.0, 20.0]), 0.0);
        assert!((load_factor(&[10.0, 10.0, 15.0]) - 0.5).abs() < 1e-12);
        assert_eq!(load_factor(&[10.0, 10.0, 5.0]), 0.0);
        assert_eq!(load_factor(&[10.0, 10.0, 100.0]), 1.0);
    }

    #[test]
    fn test_first_transform_uses_rtt_factor() {
        let clock = ManualClock::shared(0);
        let mut state = state(clock);
        let b = Name::from("/b");

        let cost = state.transform(&b, 14.0, &metrics(50));
        let expected = 10.0 * (1.0 + 0.3 * 1.5f64.ln());
        assert!((cost - expected).abs() < 1e-9);
    }

    #[test]
    fn test_changes_rate_limited_and_small_changes_suppressed() {
        let clock = ManualClock::shared(0);
        let mut state = state(clock.clone());
        state.max_multiplier = 1.5;
        let b = Name::from("/b");

        let first = state.transform(&b, 14.0, &metrics(50));
        // large jump but too soon
        assert_eq!(state.transform(&b, 14.0, &metrics(400)), first);

        clock.advance(Duration::from_secs(6));
        let third = state.transform(&b, 14.0, &metrics(400));
        assert!(third > first);
        assert!((third - 15.0).abs() < 1e-9);

        clock.advance(Duration::from_secs(6));
        // still at the cap, so the change is below five percent
        assert_eq!(state.transform(&b, 14.0, &metrics(400)), third);
    }

    #[test]
    fn test_transform_capped_and_passthrough_without_rtt() {
        let clock = ManualClock::shared(0);
        let mut state = state(clock);
        state.max_multiplier = 1.1;
        let b = Name::from("/b");
        assert!(state.transform(&b, 14.0, &metrics(4000)) <= 11.0 + 1e-9);

        let mut no_rtt = metrics(10);
        no_rtt.current_rtt = None;
        assert_eq!(state.transform(&Name::from("/c"), 12.0, &no_rtt), 12.0);
    }
}
