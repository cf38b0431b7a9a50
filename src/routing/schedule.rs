//! Single-flight recalculation schedule.
//!
//! ```text
//!   request ──▶ Scheduled{deadline} ──try_begin──▶ Calculating ──finish──▶ Idle
//!                   │ request: no-op                 │ request: rerun = true
//!                   ▼                                ▼
//!              (timer armed)              finish ─▶ Scheduled{now + interval}
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Scheduled { deadline: Instant },
    Calculating { rerun: bool },
}

/// Shared handle onto the calculation state; clones see the same state.
#[derive(Debug, Clone)]
pub struct CalculationSchedule {
    interval: Duration,
    phase: Arc<Mutex<Phase>>,
}

impl CalculationSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            phase: Arc::new(Mutex::new(Phase::Idle)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ask for a calculation one interval from `now`.
    pub fn request(&self, now: Instant) {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Idle => {
                *phase = Phase::Scheduled {
                    deadline: now + self.interval,
                };
                tracing::debug!(delay = ?self.interval, "Scheduled routing table calculation");
            }
            Phase::Scheduled { .. } => {
                tracing::trace!("Routing table calculation already scheduled");
            }
            Phase::Calculating { ref mut rerun } => {
                if !*rerun {
                    tracing::debug!("Calculation in progress, deferring recalculation");
                }
                *rerun = true;
            }
        }
    }

    /// Move into `Calculating` if the scheduled deadline has passed.
    pub fn try_begin(&self, now: Instant) -> bool {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Scheduled { deadline } if deadline <= now => {
                *phase = Phase::Calculating { rerun: false };
                true
            }
            _ => false,
        }
    }

    /// Leave `Calculating`, re-arming once if a request arrived meanwhile.
    pub fn finish(&self, now: Instant) {
        let mut phase = self.phase.lock();
        *phase = match *phase {
            Phase::Calculating { rerun: true } => Phase::Scheduled {
                deadline: now + self.interval,
            },
            Phase::Calculating { rerun: false } => Phase::Idle,
            other => other,
        };
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match *self.phase.lock() {
            Phase::Scheduled { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Scheduled { .. })
    }

    pub fn is_calculating(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Calculating { .. })
    }
}
