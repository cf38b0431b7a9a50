//! Link cost manager.
//!
//! Owns the live link state of every configured neighbor, probes stable
//! neighbors on a jittered cycle and turns RTT samples into link costs.
//! All work happens inside method calls made by the single driving task:
//! probe outcomes and hello notifications are pushed in, timers are drained
//! with [`LinkCostManager::poll_timers`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;

use super::performance::performance_score;
use super::state::{LinkMetrics, NeighborLinkState};
use crate::config::LinkCostConfig;
use crate::probe::{Face, ProbeName, ProbeOutcome, ProbeOutcomeKind, ProbeRequest};
use crate::routing::{AdjacencyTable, CalculationSchedule, TopologyDatabase};
use crate::types::{LinkStatus, Name};
use crate::util::{whole_millis, SharedClock, TimerId, TimerQueue};

/// Remaps an RTT-derived cost using the neighbor's metrics.
pub type CostTransform = Box<dyn FnMut(&Name, f64, &LinkMetrics) -> anyhow::Result<f64> + Send>;

/// Receives a real-time performance score per RTT sample.
pub type PerformanceFeedback = Box<dyn FnMut(&Name, f64) + Send>;

/// Manager handle shared with strategies and the daemon.
pub type SharedLinkCostManager = Arc<Mutex<LinkCostManager>>;

/// Fallback delay when the computed probe delay is not positive.
const MIN_PROBE_DELAY: Duration = Duration::from_secs(1);

/// Hello-protocol notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighborEvent {
    HelloSent(Name),
    HelloReceived(Name),
    HelloTimeout { neighbor: Name, timeouts: u32 },
    StatusChanged { neighbor: Name, status: LinkStatus },
}

/// Probe and update counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCostStats {
    pub probes_sent: u64,
    pub successful_measurements: u64,
    pub cost_updates: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ManagerTask {
    WarmUp,
    Probe(Name),
    StatusReport,
}

#[derive(Debug, Clone)]
struct PendingProbe {
    neighbor: Name,
    sent_at: Instant,
}

/// Authoritative live link-quality view.
pub struct LinkCostManager {
    config: LinkCostConfig,
    clock: SharedClock,
    adjacencies: Arc<dyn AdjacencyTable>,
    lsdb: Arc<dyn TopologyDatabase>,
    face: Arc<dyn Face>,
    calculations: CalculationSchedule,

    links: BTreeMap<Name, NeighborLinkState>,
    pending: HashMap<u32, PendingProbe>,
    timers: TimerQueue<ManagerTask>,
    probe_timers: HashMap<Name, TimerId>,
    next_seq: u32,
    active: bool,

    cost_transform: Option<CostTransform>,
    feedback: Option<PerformanceFeedback>,
    stats: LinkCostStats,
}

impl LinkCostManager {
    pub fn new(
        config: LinkCostConfig,
        clock: SharedClock,
        adjacencies: Arc<dyn AdjacencyTable>,
        lsdb: Arc<dyn TopologyDatabase>,
        face: Arc<dyn Face>,
        calculations: CalculationSchedule,
    ) -> Self {
        Self {
            config,
            clock,
            adjacencies,
            lsdb,
            face,
            calculations,
            links: BTreeMap::new(),
            pending: HashMap::new(),
            timers: TimerQueue::new(),
            probe_timers: HashMap::new(),
            next_seq: 1,
            active: false,
            cost_transform: None,
            feedback: None,
            stats: LinkCostStats::default(),
        }
    }

    /// Wrap into a shared handle.
    pub fn into_shared(self) -> SharedLinkCostManager {
        Arc::new(Mutex::new(self))
    }

    /// Snapshot every configured neighbor into link state.
    pub fn initialize(&mut self) {
        let now = self.clock.now();
        for adjacency in self.adjacencies.adjacencies() {
            tracing::debug!(
                neighbor = %adjacency.name,
                original_cost = adjacency.original_cost,
                "Initialized link state"
            );
            let state = NeighborLinkState::new(
                adjacency.name.clone(),
                adjacency.status,
                adjacency.original_cost,
                adjacency.link_cost,
                adjacency.timeouts,
                now,
                self.config.rtt_history_capacity,
            );
            self.links.insert(adjacency.name, state);
        }
        tracing::info!(neighbors = self.links.len(), "Link cost manager initialized");
    }

    /// Arm the warm-up delay; probing starts when it expires.
    pub fn start(&mut self) {
        if self.active {
            tracing::warn!("Link cost manager already active");
            return;
        }
        self.active = true;
        let deadline = self.clock.now() + self.config.warm_up;
        self.timers.schedule(deadline, ManagerTask::WarmUp);
        tracing::info!(warm_up = ?self.config.warm_up, "Link cost manager started");
    }

    /// Cancel everything, restore configured costs and request a rebuild.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.timers.cancel_all();
        self.probe_timers.clear();
        self.pending.clear();

        for (neighbor, link) in &mut self.links {
            link.current_cost = link.original_cost;
            match self.adjacencies.link_cost(neighbor) {
                Some(cost) if cost != link.original_cost => {
                    if let Err(e) = self.adjacencies.set_link_cost(neighbor, link.original_cost) {
                        tracing::error!(neighbor = %neighbor, error = %e, "Failed to restore cost");
                    } else {
                        tracing::info!(
                            neighbor = %neighbor,
                            cost = link.original_cost,
                            "Restored original cost"
                        );
                    }
                }
                _ => {}
            }
        }

        self.lsdb.schedule_adjacency_build();
        tracing::info!("Link cost manager stopped and original costs restored");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Earliest pending timer.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Run every timer that is due.
    pub fn poll_timers(&mut self) {
        let now = self.clock.now();
        while let Some((_, task)) = self.timers.pop_due(now) {
            match task {
                ManagerTask::WarmUp => {
                    let stable: Vec<Name> = self
                        .links
                        .values()
                        .filter(|link| link.is_stable())
                        .map(|link| link.neighbor.clone())
                        .collect();
                    for neighbor in stable {
                        self.schedule_probe(&neighbor);
                    }
                    let deadline = now + self.config.status_report_interval;
                    self.timers.schedule(deadline, ManagerTask::StatusReport);
                }
                ManagerTask::Probe(neighbor) => {
                    self.probe_timers.remove(&neighbor);
                    if self.can_probe_now(&neighbor) {
                        self.send_probe(&neighbor);
                    }
                    self.schedule_probe(&neighbor);
                }
                ManagerTask::StatusReport => {
                    self.status_report();
                    let deadline = now + self.config.status_report_interval;
                    self.timers.schedule(deadline, ManagerTask::StatusReport);
                }
            }
        }
    }

    /// Arm (or re-arm) the jittered probe timer of `neighbor`.
    pub fn schedule_probe(&mut self, neighbor: &Name) {
        if !self.active {
            return;
        }
        let delay = self.probe_delay();
        if let Some(previous) = self.probe_timers.remove(neighbor) {
            self.timers.cancel(previous);
        }
        let id = self
            .timers
            .schedule(self.clock.now() + delay, ManagerTask::Probe(neighbor.clone()));
        self.probe_timers.insert(neighbor.clone(), id);
    }

    /// Arm the probe timer of `neighbor` unless one is already pending.
    fn ensure_probe_scheduled(&mut self, neighbor: &Name) {
        if !self.probe_timers.contains_key(neighbor) {
            self.schedule_probe(neighbor);
        }
    }

    fn probe_delay(&self) -> Duration {
        let jitter_ms = self.config.probe_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        let delay = self.config.probe_interval + jitter;
        if delay.is_zero() {
            MIN_PROBE_DELAY
        } else {
            delay
        }
    }

    fn can_probe_now(&self, neighbor: &Name) -> bool {
        self.active && self.links.get(neighbor).is_some_and(NeighborLinkState::is_stable)
    }

    /// Express one probe towards `neighbor`.
    pub fn send_probe(&mut self, neighbor: &Name) -> Option<u32> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let request = ProbeRequest::new(
            &ProbeName::new(neighbor.clone(), seq),
            self.config.probe_lifetime,
        );
        self.pending.insert(
            seq,
            PendingProbe {
                neighbor: neighbor.clone(),
                sent_at: self.clock.now(),
            },
        );

        if let Err(e) = self.face.express(request) {
            self.pending.remove(&seq);
            tracing::warn!(neighbor = %neighbor, seq, error = %e, "Failed to express RTT probe");
            return None;
        }

        self.stats.probes_sent += 1;
        tracing::trace!(neighbor = %neighbor, seq, "RTT probe sent");
        Some(seq)
    }

    // ========================================================================
    // Probe outcomes
    // ========================================================================

    pub fn on_probe_outcome(&mut self, outcome: &ProbeOutcome) {
        match outcome.kind {
            ProbeOutcomeKind::Data => self.handle_rtt_response(&outcome.neighbor, outcome.seq),
            ProbeOutcomeKind::Nack | ProbeOutcomeKind::Timeout => {
                self.handle_rtt_timeout(&outcome.neighbor, outcome.seq);
            }
        }
    }

    /// Record the RTT of an answered probe and update the cost if warranted.
    pub fn handle_rtt_response(&mut self, neighbor: &Name, seq: u32) {
        let Some(pending) = self.pending.remove(&seq) else {
            return;
        };
        if pending.neighbor != *neighbor {
            tracing::debug!(
                neighbor = %neighbor,
                expected = %pending.neighbor,
                seq,
                "Probe response from unexpected neighbor"
            );
        }
        let neighbor = pending.neighbor;

        let mut rtt = self.clock.now().saturating_duration_since(pending.sent_at);

        if rtt < self.config.rtt_floor {
            tracing::debug!(neighbor = %neighbor, rtt = ?rtt, "RTT below floor, clamping");
            rtt = self.config.rtt_floor;
        } else if rtt > self.config.rtt_ceiling {
            // Compared at full precision: 5000.5ms is already past a 5s ceiling.
            tracing::warn!(
                neighbor = %neighbor,
                rtt_ms = whole_millis(rtt),
                "RTT too large, discarding measurement"
            );
            return;
        }
        self.stats.successful_measurements += 1;

        let Some(link) = self.links.get_mut(&neighbor) else {
            return;
        };
        if !link.is_stable() {
            return;
        }
        link.record_rtt(rtt);
        let samples = link.sample_count();
        tracing::debug!(neighbor = %neighbor, rtt_ms = whole_millis(rtt), samples, "RTT measurement");

        if samples >= self.config.min_feedback_samples {
            if let Some(feedback) = self.feedback.as_mut() {
                let history: Vec<Duration> = link.rtt_history().iter().copied().collect();
                let performance = performance_score(rtt, &history, link.timeout_count);
                feedback(&neighbor, performance);
                tracing::debug!(
                    neighbor = %neighbor,
                    performance,
                    rtt_ms = whole_millis(rtt),
                    "Performance feedback sent"
                );
            }
        }

        if samples >= self.config.min_cost_samples {
            if let Some(new_cost) = self.calculate_new_cost(&neighbor) {
                if self.should_update_cost(&neighbor, new_cost) {
                    self.update_neighbor_cost(&neighbor, new_cost);
                }
            }
        }
    }

    /// Forget an unanswered probe. The next cycle is the retry.
    pub fn handle_rtt_timeout(&mut self, neighbor: &Name, seq: u32) {
        if self.pending.remove(&seq).is_some() {
            tracing::debug!(neighbor = %neighbor, seq, "RTT probe timeout");
        }
    }

    // ========================================================================
    // Cost computation
    // ========================================================================

    /// RTT-derived cost; `None` when the neighbor does not participate.
    pub fn calculate_new_cost(&self, neighbor: &Name) -> Option<f64> {
        let Some(link) = self.links.get(neighbor) else {
            tracing::debug!(neighbor = %neighbor, "No link state, not participating");
            return None;
        };
        if link.status == LinkStatus::Inactive {
            tracing::debug!(neighbor = %neighbor, "Neighbor inactive, skipping cost calculation");
            return None;
        }

        let Some(average) = link.average_rtt() else {
            return Some(link.original_cost);
        };
        let rtt_factor = (1.0 + whole_millis(average) / 100.0).ln();
        let cost = (link.original_cost * (1.0 + rtt_factor))
            .min(link.original_cost * self.config.max_cost_multiplier);
        Some(cost.round())
    }

    /// Hysteresis gate against the cost currently held in link state.
    pub fn should_update_cost(&self, neighbor: &Name, new_cost: f64) -> bool {
        let Some(link) = self.links.get(neighbor) else {
            return false;
        };
        if link.current_cost <= 0.0 {
            return new_cost != link.current_cost;
        }
        (new_cost - link.current_cost).abs() / link.current_cost >= self.config.cost_change_threshold
    }

    /// Apply a new cost, passing it through the transform hook first.
    pub fn update_neighbor_cost(&mut self, neighbor: &Name, rtt_cost: f64) {
        let Some(old_cost) = self.adjacencies.link_cost(neighbor) else {
            tracing::error!(neighbor = %neighbor, "Cannot find adjacency");
            return;
        };
        let metrics = match self.links.get(neighbor) {
            Some(link) if link.status == LinkStatus::Inactive => {
                tracing::debug!(neighbor = %neighbor, "Skipping cost update for inactive neighbor");
                return;
            }
            Some(link) => link.metrics(),
            None => return,
        };

        let mut final_cost = rtt_cost;
        if let Some(transform) = self.cost_transform.as_mut() {
            match transform(neighbor, rtt_cost, &metrics) {
                Ok(cost) if cost.is_finite() && cost > 0.0 => {
                    tracing::debug!(neighbor = %neighbor, rtt_cost, cost, "Cost transformed");
                    final_cost = cost;
                }
                Ok(cost) => {
                    tracing::error!(neighbor = %neighbor, cost, "Cost transform returned invalid cost");
                }
                Err(e) => {
                    tracing::error!(neighbor = %neighbor, error = %e, "Cost transform failed");
                }
            }
        }

        if old_cost > 0.0 && (final_cost - old_cost).abs() / old_cost < self.config.fine_change_threshold
        {
            tracing::trace!(neighbor = %neighbor, old_cost, final_cost, "Cost change too small");
            return;
        }

        if let Err(e) = self.adjacencies.set_link_cost(neighbor, final_cost) {
            tracing::error!(neighbor = %neighbor, error = %e, "Failed to write link cost");
            return;
        }

        let now = self.clock.now();
        let trigger_interval = self.config.trigger_interval;
        let Some(link) = self.links.get_mut(neighbor) else {
            return;
        };
        link.current_cost = final_cost;

        if link
            .last_trigger
            .is_some_and(|last| now.saturating_duration_since(last) < trigger_interval)
        {
            tracing::trace!(neighbor = %neighbor, "Rate limiting rebuild trigger");
            return;
        }
        link.last_trigger = Some(now);

        if link.timeout_count == 0 {
            self.lsdb.schedule_adjacency_build();
            self.calculations.request(now);
            tracing::info!(neighbor = %neighbor, "Triggered adjacency rebuild for cost update");
        }

        self.stats.cost_updates += 1;
        tracing::info!(neighbor = %neighbor, old_cost, new_cost = final_cost, "Updated link cost");
    }

    // ========================================================================
    // Hello notifications
    // ========================================================================

    pub fn on_neighbor_event(&mut self, event: &NeighborEvent) {
        match event {
            NeighborEvent::HelloSent(neighbor) => self.on_hello_sent(neighbor),
            NeighborEvent::HelloReceived(neighbor) => self.on_hello_received(neighbor),
            NeighborEvent::HelloTimeout { neighbor, timeouts } => {
                self.on_hello_timeout(neighbor, *timeouts);
            }
            NeighborEvent::StatusChanged { neighbor, status } => {
                self.on_neighbor_status_changed(neighbor, *status);
            }
        }
    }

    pub fn on_hello_sent(&mut self, neighbor: &Name) {
        if self.links.contains_key(neighbor) {
            tracing::trace!(neighbor = %neighbor, "Hello sent");
        }
    }

    pub fn on_hello_received(&mut self, neighbor: &Name) {
        let now = self.clock.now();
        let Some(link) = self.links.get_mut(neighbor) else {
            return;
        };
        link.status = LinkStatus::Active;
        link.timeout_count = 0;
        link.last_success = now;
        tracing::trace!(neighbor = %neighbor, "Hello received, link stable");

        if self.active && link.is_stable() && link.sample_count() == 0 {
            self.ensure_probe_scheduled(neighbor);
        }
    }

    pub fn on_hello_timeout(&mut self, neighbor: &Name, timeouts: u32) {
        let threshold = self.config.retry_threshold;
        let Some(link) = self.links.get_mut(neighbor) else {
            return;
        };
        link.timeout_count = timeouts;
        tracing::debug!(neighbor = %neighbor, timeouts, "Hello timeout");

        if timeouts >= threshold {
            link.status = LinkStatus::Inactive;
            link.clear_history();
            tracing::info!(neighbor = %neighbor, "Neighbor became INACTIVE due to timeouts");
        }
    }

    pub fn on_neighbor_status_changed(&mut self, neighbor: &Name, status: LinkStatus) {
        let now = self.clock.now();
        let threshold = self.config.retry_threshold;
        let Some(link) = self.links.get_mut(neighbor) else {
            return;
        };
        let old_status = link.status;
        link.status = status;
        tracing::info!(neighbor = %neighbor, from = %old_status, to = %status, "Neighbor status changed");

        match status {
            LinkStatus::Inactive => {
                link.clear_history();
                link.timeout_count = threshold;
                self.pending.retain(|_, pending| pending.neighbor != *neighbor);
                tracing::info!(neighbor = %neighbor, "Cleaned up state for inactive neighbor");
            }
            LinkStatus::Active if old_status != LinkStatus::Active => {
                let original = link.original_cost;
                link.current_cost = original;
                link.timeout_count = 0;
                link.last_success = now;
                match self.adjacencies.set_link_cost(neighbor, original) {
                    Ok(()) => {
                        tracing::info!(neighbor = %neighbor, cost = original, "Restored original cost");
                    }
                    Err(e) => {
                        tracing::error!(neighbor = %neighbor, error = %e, "Failed to restore cost");
                    }
                }
                if self.active {
                    self.ensure_probe_scheduled(neighbor);
                }
            }
            LinkStatus::Active => {}
        }
    }

    // ========================================================================
    // Hooks
    // ========================================================================

    pub fn set_cost_transform(&mut self, transform: CostTransform) {
        self.cost_transform = Some(transform);
        tracing::info!("Cost transform registered");
    }

    pub fn clear_cost_transform(&mut self) {
        if self.cost_transform.take().is_some() {
            tracing::info!("Cost transform cleared, using RTT costs");
        }
    }

    pub fn has_cost_transform(&self) -> bool {
        self.cost_transform.is_some()
    }

    pub fn set_feedback(&mut self, feedback: PerformanceFeedback) {
        self.feedback = Some(feedback);
        tracing::info!("Performance feedback registered");
    }

    pub fn clear_feedback(&mut self) {
        if self.feedback.take().is_some() {
            tracing::info!("Performance feedback cleared");
        }
    }

    pub fn has_feedback(&self) -> bool {
        self.feedback.is_some()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn current_cost(&self, neighbor: &Name) -> Option<f64> {
        self.links.get(neighbor).map(|link| link.current_cost)
    }

    pub fn original_cost(&self, neighbor: &Name) -> Option<f64> {
        self.links.get(neighbor).map(|link| link.original_cost)
    }

    /// Average RTT; `None` for unknown neighbors and neighbors without samples.
    pub fn average_rtt(&self, neighbor: &Name) -> Option<Duration> {
        self.links.get(neighbor).and_then(NeighborLinkState::average_rtt)
    }

    pub fn rtt_history(&self, neighbor: &Name) -> Option<Vec<Duration>> {
        self.links
            .get(neighbor)
            .map(|link| link.rtt_history().iter().copied().collect())
    }

    pub fn timeout_count(&self, neighbor: &Name) -> Option<u32> {
        self.links.get(neighbor).map(|link| link.timeout_count)
    }

    pub fn last_success(&self, neighbor: &Name) -> Option<Instant> {
        self.links.get(neighbor).map(|link| link.last_success)
    }

    pub fn link_status(&self, neighbor: &Name) -> Option<LinkStatus> {
        self.links.get(neighbor).map(|link| link.status)
    }

    pub fn link_metrics(&self, neighbor: &Name) -> Option<LinkMetrics> {
        self.links.get(neighbor).map(NeighborLinkState::metrics)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &Name> {
        self.links.keys()
    }

    pub fn pending_probes(&self) -> usize {
        self.pending.len()
    }

    pub fn is_probe_pending(&self, seq: u32) -> bool {
        self.pending.contains_key(&seq)
    }

    pub fn stats(&self) -> LinkCostStats {
        self.stats
    }

    pub fn config(&self) -> &LinkCostConfig {
        &self.config
    }

    /// Log counters and one line per neighbor.
    pub fn status_report(&self) {
        if !self.active {
            return;
        }
        tracing::info!(
            probes_sent = self.stats.probes_sent,
            successful = self.stats.successful_measurements,
            cost_updates = self.stats.cost_updates,
            neighbors = self.links.len(),
            "Link cost manager status"
        );
        for link in self.links.values() {
            tracing::info!(
                neighbor = %link.neighbor,
                status = %link.status,
                cost = link.current_cost,
                original_cost = link.original_cost,
                samples = link.sample_count(),
                avg_rtt_ms = link.average_rtt().map_or(0.0, whole_millis),
                timeouts = link.timeout_count,
                "Link status"
            );
        }
    }
}

impl Drop for LinkCostManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for LinkCostManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkCostManager")
            .field("active", &self.active)
            .field("neighbors", &self.links.len())
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
