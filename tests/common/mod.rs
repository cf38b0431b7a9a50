//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use svarog::config::LinkCostConfig;
use svarog::error::{ProbeError, Result};
use svarog::linkcost::LinkCostManager;
use svarog::probe::{Face, ProbeRequest};
use svarog::routing::{
    Adjacency, CalculationSchedule, InMemoryAdjacencyTable, InMemoryTopologyDatabase,
};
use svarog::types::Name;
use svarog::util::ManualClock;

/// Face that records every request instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingFace {
    sent: Mutex<Vec<ProbeRequest>>,
    refuse: Mutex<bool>,
}

impl RecordingFace {
    pub fn sent(&self) -> Vec<ProbeRequest> {
        self.sent.lock().clone()
    }

    pub fn refuse(&self, refuse: bool) {
        *self.refuse.lock() = refuse;
    }
}

impl Face for RecordingFace {
    fn express(&self, request: ProbeRequest) -> Result<()> {
        if *self.refuse.lock() {
            return Err(ProbeError::SendFailed("face down".into()).into());
        }
        self.sent.lock().push(request);
        Ok(())
    }
}

/// A manager wired to in-memory collaborators and a hand-driven clock.
pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub adjacencies: Arc<InMemoryAdjacencyTable>,
    pub lsdb: Arc<InMemoryTopologyDatabase>,
    pub face: Arc<RecordingFace>,
    pub schedule: CalculationSchedule,
    pub manager: LinkCostManager,
}

impl Fixture {
    pub fn new(config: LinkCostConfig, neighbors: &[(&str, f64)]) -> Self {
        let clock = ManualClock::shared(12 * 60);
        let adjacencies = Arc::new(InMemoryAdjacencyTable::with_adjacencies(
            neighbors.iter().map(|(name, cost)| Adjacency::new(*name, *cost)),
        ));
        let lsdb = Arc::new(InMemoryTopologyDatabase::new());
        let face = Arc::new(RecordingFace::default());
        let schedule = CalculationSchedule::new(Duration::from_secs(15));

        let mut manager = LinkCostManager::new(
            config,
            clock.clone(),
            adjacencies.clone(),
            lsdb.clone(),
            face.clone(),
            schedule.clone(),
        );
        manager.initialize();

        Self {
            clock,
            adjacencies,
            lsdb,
            face,
            schedule,
            manager,
        }
    }

    /// Send a probe to `neighbor` and answer it after `rtt`.
    pub fn sample(&mut self, neighbor: &Name, rtt: Duration) -> u32 {
        let seq = self.manager.send_probe(neighbor).expect("probe expressed");
        self.clock.advance(rtt);
        self.manager.handle_rtt_response(neighbor, seq);
        seq
    }

    pub fn samples(&mut self, neighbor: &Name, rtt: Duration, count: usize) {
        for _ in 0..count {
            self.sample(neighbor, rtt);
        }
    }
}

/// Config with deterministic probe timing.
pub fn deterministic_config() -> LinkCostConfig {
    LinkCostConfig {
        probe_jitter: Duration::ZERO,
        ..LinkCostConfig::default()
    }
}

pub fn name(s: &str) -> Name {
    Name::from(s)
}
