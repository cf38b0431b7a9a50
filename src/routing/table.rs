//! Routing table and change snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Name;

/// Next hop towards a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextHop {
    pub neighbor: Name,
    pub cost: f64,
}

/// Next hops for one destination, cheapest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingTableEntry {
    pub destination: Name,
    pub next_hops: Vec<NextHop>,
}

impl RoutingTableEntry {
    pub fn new(destination: Name) -> Self {
        Self {
            destination,
            next_hops: Vec::new(),
        }
    }

    /// Add a next hop, replacing an existing one through the same neighbor.
    pub fn add_next_hop(&mut self, hop: NextHop) {
        match self.next_hops.iter_mut().find(|h| h.neighbor == hop.neighbor) {
            Some(existing) => existing.cost = hop.cost,
            None => self.next_hops.push(hop),
        }
        self.next_hops.sort_by(|a, b| a.cost.total_cmp(&b.cost));
    }

    pub fn best(&self) -> Option<&NextHop> {
        self.next_hops.first()
    }
}

/// Live routing table plus the separate hyperbolic dry-run table.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: BTreeMap<Name, RoutingTableEntry>,
    dry_run: BTreeMap<Name, RoutingTableEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the live entries.
    pub fn replace(&mut self, entries: Vec<RoutingTableEntry>) {
        self.entries.clear();
        Self::merge(&mut self.entries, entries);
    }

    /// Replace the dry-run entries.
    pub fn replace_dry_run(&mut self, entries: Vec<RoutingTableEntry>) {
        self.dry_run.clear();
        Self::merge(&mut self.dry_run, entries);
    }

    fn merge(target: &mut BTreeMap<Name, RoutingTableEntry>, entries: Vec<RoutingTableEntry>) {
        for entry in entries {
            let slot = target
                .entry(entry.destination.clone())
                .or_insert_with(|| RoutingTableEntry::new(entry.destination.clone()));
            for hop in entry.next_hops {
                slot.add_next_hop(hop);
            }
        }
    }

    pub fn add_next_hop(&mut self, destination: &Name, hop: NextHop) {
        self.entries
            .entry(destination.clone())
            .or_insert_with(|| RoutingTableEntry::new(destination.clone()))
            .add_next_hop(hop);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dry_run.clear();
    }

    pub fn clear_dry_run(&mut self) {
        self.dry_run.clear();
    }

    pub fn get(&self, destination: &Name) -> Option<&RoutingTableEntry> {
        self.entries.get(destination)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RoutingTableEntry> {
        self.entries.values()
    }

    pub fn dry_run_entries(&self) -> impl Iterator<Item = &RoutingTableEntry> {
        self.dry_run.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> RoutingTableSnapshot {
        RoutingTableSnapshot {
            entries: self.entries.values().cloned().collect(),
            dry_run: self.dry_run.values().cloned().collect(),
        }
    }
}

/// Copy of the table handed to downstream consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingTableSnapshot {
    pub entries: Vec<RoutingTableEntry>,
    pub dry_run: Vec<RoutingTableEntry>,
}

impl RoutingTableSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.dry_run.is_empty()
    }

    pub fn entry(&self, destination: &Name) -> Option<&RoutingTableEntry> {
        self.entries.iter().find(|e| e.destination == *destination)
    }
}
