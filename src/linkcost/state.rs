//! Per-neighbor link state.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::types::{LinkStatus, Name};
use crate::util::average_duration;

/// Live view of one outgoing link.
#[derive(Debug, Clone)]
pub struct NeighborLinkState {
    pub neighbor: Name,
    pub status: LinkStatus,
    /// Configured baseline; never changed by the cost manager.
    pub original_cost: f64,
    pub current_cost: f64,
    pub timeout_count: u32,
    pub last_success: Instant,
    /// Last time this neighbor triggered a rebuild request.
    pub last_trigger: Option<Instant>,
    rtt_history: VecDeque<Duration>,
    capacity: usize,
}

impl NeighborLinkState {
    pub fn new(
        neighbor: Name,
        status: LinkStatus,
        original_cost: f64,
        current_cost: f64,
        timeout_count: u32,
        now: Instant,
        capacity: usize,
    ) -> Self {
        Self {
            neighbor,
            status,
            original_cost,
            current_cost,
            timeout_count,
            last_success: now,
            last_trigger: None,
            rtt_history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// ACTIVE with no outstanding hello timeouts.
    pub fn is_stable(&self) -> bool {
        self.status == LinkStatus::Active && self.timeout_count == 0
    }

    /// Append a sample, evicting the oldest when full.
    pub fn record_rtt(&mut self, rtt: Duration) {
        if self.rtt_history.len() >= self.capacity {
            self.rtt_history.pop_front();
        }
        self.rtt_history.push_back(rtt);
    }

    pub fn clear_history(&mut self) {
        self.rtt_history.clear();
    }

    pub fn rtt_history(&self) -> &VecDeque<Duration> {
        &self.rtt_history
    }

    pub fn sample_count(&self) -> usize {
        self.rtt_history.len()
    }

    pub fn average_rtt(&self) -> Option<Duration> {
        average_duration(&self.rtt_history)
    }

    /// Read-only projection handed to cost hooks.
    pub fn metrics(&self) -> LinkMetrics {
        LinkMetrics {
            neighbor: self.neighbor.clone(),
            status: self.status,
            original_cost: self.original_cost,
            current_cost: self.current_cost,
            timeout_count: self.timeout_count,
            last_success: self.last_success,
            rtt_history: self.rtt_history.iter().copied().collect(),
            current_rtt: self.average_rtt(),
        }
    }
}

/// Snapshot of a neighbor's link state.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkMetrics {
    pub neighbor: Name,
    pub status: LinkStatus,
    pub original_cost: f64,
    pub current_cost: f64,
    pub timeout_count: u32,
    pub last_success: Instant,
    /// Oldest first.
    pub rtt_history: Vec<Duration>,
    /// Average RTT, `None` without samples.
    pub current_rtt: Option<Duration>,
}
