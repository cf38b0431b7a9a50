//! Time-of-day performance patterns.

use std::collections::HashMap;
use std::time::Instant;

use crate::types::Name;

/// Width of one time slot in minutes.
pub const SLOT_MINUTES: u32 = 10;

/// Performance assumed for a slot that has never been observed.
pub const UNSEEN_SLOT_PERFORMANCE: f64 = 0.5;

/// Slot key for a minute of the day: the slot's starting minute.
pub fn slot_key(minute_of_day: u32) -> u32 {
    let hour = minute_of_day / 60;
    let minute = minute_of_day % 60;
    hour * 60 + minute / SLOT_MINUTES * SLOT_MINUTES
}

/// Smoothed performance of one neighbor in one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSlot {
    pub hour: u32,
    pub minute: u32,
    pub average_performance: f64,
    pub sample_count: u64,
    pub last_update: Instant,
}

/// Per-neighbor, per-slot exponential moving averages.
#[derive(Debug, Clone)]
pub struct TemporalPatterns {
    alpha: f64,
    slots: HashMap<Name, HashMap<u32, TimeSlot>>,
}

impl TemporalPatterns {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            slots: HashMap::new(),
        }
    }

    /// Fold one observation into the slot containing `minute_of_day`.
    pub fn update(&mut self, neighbor: &Name, minute_of_day: u32, performance: f64, now: Instant) {
        let key = slot_key(minute_of_day);
        let alpha = self.alpha;
        self.slots
            .entry(neighbor.clone())
            .or_default()
            .entry(key)
            .and_modify(|slot| {
                slot.average_performance =
                    alpha * performance + (1.0 - alpha) * slot.average_performance;
                slot.sample_count += 1;
                slot.last_update = now;
            })
            .or_insert_with(|| TimeSlot {
                hour: key / 60,
                minute: key % 60,
                average_performance: performance,
                sample_count: 1,
                last_update: now,
            });
    }

    /// Smoothed performance for the current slot.
    pub fn feature(&self, neighbor: &Name, minute_of_day: u32) -> f64 {
        self.slot(neighbor, minute_of_day)
            .map_or(UNSEEN_SLOT_PERFORMANCE, |slot| slot.average_performance)
    }

    pub fn slot(&self, neighbor: &Name, minute_of_day: u32) -> Option<&TimeSlot> {
        self.slots
            .get(neighbor)
            .and_then(|slots| slots.get(&slot_key(minute_of_day)))
    }
}
