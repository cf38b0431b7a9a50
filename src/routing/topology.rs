//! Collaborator interfaces: neighbor table, topology database, path calculators.
//!
//! The in-memory implementations back tests and embedders that keep their
//! own link-state database elsewhere and only mirror it here.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::table::RoutingTableEntry;
use crate::error::{Error, Result};
use crate::types::{AdvertisementType, LinkStatus, Name};

/// One configured neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjacency {
    pub name: Name,
    pub status: LinkStatus,
    /// Cost currently advertised.
    pub link_cost: f64,
    /// Cost from configuration.
    pub original_cost: f64,
    /// Consecutive hello timeouts.
    pub timeouts: u32,
}

impl Adjacency {
    pub fn new(name: impl Into<Name>, cost: f64) -> Self {
        Self {
            name: name.into(),
            status: LinkStatus::Active,
            link_cost: cost,
            original_cost: cost,
            timeouts: 0,
        }
    }
}

/// Neighbor table owned by the hello protocol.
pub trait AdjacencyTable: Send + Sync {
    fn adjacencies(&self) -> Vec<Adjacency>;

    /// Advertised cost of `neighbor`.
    fn link_cost(&self, neighbor: &Name) -> Option<f64>;

    fn set_link_cost(&self, neighbor: &Name, cost: f64) -> Result<()>;
}

/// Neighbor table held in memory.
#[derive(Debug, Default)]
pub struct InMemoryAdjacencyTable {
    entries: DashMap<Name, Adjacency>,
}

impl InMemoryAdjacencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adjacencies(adjacencies: impl IntoIterator<Item = Adjacency>) -> Self {
        let table = Self::new();
        for adjacency in adjacencies {
            table.insert(adjacency);
        }
        table
    }

    pub fn insert(&self, adjacency: Adjacency) {
        self.entries.insert(adjacency.name.clone(), adjacency);
    }

    pub fn get(&self, neighbor: &Name) -> Option<Adjacency> {
        self.entries.get(neighbor).map(|entry| entry.value().clone())
    }

    pub fn set_status(&self, neighbor: &Name, status: LinkStatus) -> Result<()> {
        let mut entry = self
            .entries
            .get_mut(neighbor)
            .ok_or_else(|| Error::NeighborNotFound(neighbor.clone()))?;
        entry.status = status;
        Ok(())
    }
}

impl AdjacencyTable for InMemoryAdjacencyTable {
    fn adjacencies(&self) -> Vec<Adjacency> {
        let mut all: Vec<Adjacency> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn link_cost(&self, neighbor: &Name) -> Option<f64> {
        self.entries.get(neighbor).map(|entry| entry.link_cost)
    }

    fn set_link_cost(&self, neighbor: &Name, cost: f64) -> Result<()> {
        let mut entry = self
            .entries
            .get_mut(neighbor)
            .ok_or_else(|| Error::NeighborNotFound(neighbor.clone()))?;
        entry.link_cost = cost;
        Ok(())
    }
}

/// Directed link between two routers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: Name,
    pub target: Name,
    pub cost: f64,
}

/// Hyperbolic coordinates of a router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub radius: f64,
    pub angles: Vec<f64>,
}

/// Graph handed to a path calculator.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyMap {
    pub kind: AdvertisementType,
    pub routers: BTreeSet<Name>,
    pub links: Vec<Link>,
    pub coordinates: BTreeMap<Name, Coordinate>,
}

impl TopologyMap {
    pub fn empty(kind: AdvertisementType) -> Self {
        Self {
            kind,
            routers: BTreeSet::new(),
            links: Vec::new(),
            coordinates: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    /// Links leaving `router`.
    pub fn links_from<'a>(&'a self, router: &'a Name) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |link| link.source == *router)
    }
}

/// Kind of change reported by the topology database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LsdbUpdateKind {
    Installed,
    Updated,
    Removed,
}

/// Topology database change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsdbUpdate {
    pub kind: LsdbUpdateKind,
    pub advertisement: AdvertisementType,
    pub origin: Name,
}

/// Link-state database as seen by the routing engine.
pub trait TopologyDatabase: Send + Sync {
    /// Ask for this router's adjacency advertisement to be rebuilt.
    fn schedule_adjacency_build(&self);

    /// Whether a rebuild is pending (the database is about to change).
    fn is_adjacency_build_scheduled(&self) -> bool;

    /// Current graph built from advertisements of `kind`.
    fn topology(&self, kind: AdvertisementType) -> TopologyMap;

    /// Whether an advertisement of `kind` from `origin` is installed.
    fn has_advertisement(&self, origin: &Name, kind: AdvertisementType) -> bool;
}

/// Shortest-path algorithm: graph in, next hops out.
pub trait PathCalculator: Send + Sync {
    fn calculate(&self, source: &Name, map: &TopologyMap) -> Vec<RoutingTableEntry>;
}

/// Topology database held in memory.
#[derive(Debug)]
pub struct InMemoryTopologyDatabase {
    adjacency: RwLock<BTreeMap<Name, Vec<(Name, f64)>>>,
    coordinates: RwLock<BTreeMap<Name, Coordinate>>,
    build_scheduled: AtomicBool,
    build_requests: AtomicU64,
    updates: broadcast::Sender<LsdbUpdate>,
}

impl Default for InMemoryTopologyDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTopologyDatabase {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            adjacency: RwLock::new(BTreeMap::new()),
            coordinates: RwLock::new(BTreeMap::new()),
            build_scheduled: AtomicBool::new(false),
            build_requests: AtomicU64::new(0),
            updates,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LsdbUpdate> {
        self.updates.subscribe()
    }

    /// Install or replace the adjacency advertisement of `origin`.
    pub fn install_adjacency(&self, origin: Name, neighbors: Vec<(Name, f64)>) -> LsdbUpdate {
        let previous = self.adjacency.write().insert(origin.clone(), neighbors);
        self.notify(previous.is_some(), AdvertisementType::Adjacency, origin)
    }

    /// Install or replace the coordinate advertisement of `origin`.
    pub fn install_coordinate(&self, origin: Name, coordinate: Coordinate) -> LsdbUpdate {
        let previous = self.coordinates.write().insert(origin.clone(), coordinate);
        self.notify(previous.is_some(), AdvertisementType::Coordinate, origin)
    }

    /// Remove an advertisement; `None` when it was not present.
    pub fn remove(&self, origin: &Name, advertisement: AdvertisementType) -> Option<LsdbUpdate> {
        let removed = match advertisement {
            AdvertisementType::Adjacency => self.adjacency.write().remove(origin).is_some(),
            AdvertisementType::Coordinate => self.coordinates.write().remove(origin).is_some(),
            AdvertisementType::Name => false,
        };
        removed.then(|| {
            let update = LsdbUpdate {
                kind: LsdbUpdateKind::Removed,
                advertisement,
                origin: origin.clone(),
            };
            // No subscribers is fine.
            let _ = self.updates.send(update.clone());
            update
        })
    }

    /// Mark the pending adjacency rebuild as done.
    pub fn complete_adjacency_build(&self) -> bool {
        self.build_scheduled.swap(false, Ordering::AcqRel)
    }

    /// Rebuild requests received so far.
    pub fn build_requests(&self) -> u64 {
        self.build_requests.load(Ordering::Relaxed)
    }

    fn notify(&self, replaced: bool, advertisement: AdvertisementType, origin: Name) -> LsdbUpdate {
        let update = LsdbUpdate {
            kind: if replaced {
                LsdbUpdateKind::Updated
            } else {
                LsdbUpdateKind::Installed
            },
            advertisement,
            origin,
        };
        let _ = self.updates.send(update.clone());
        update
    }
}

impl TopologyDatabase for InMemoryTopologyDatabase {
    fn schedule_adjacency_build(&self) {
        self.build_requests.fetch_add(1, Ordering::Relaxed);
        self.build_scheduled.store(true, Ordering::Release);
    }

    fn is_adjacency_build_scheduled(&self) -> bool {
        self.build_scheduled.load(Ordering::Acquire)
    }

    fn has_advertisement(&self, origin: &Name, kind: AdvertisementType) -> bool {
        match kind {
            AdvertisementType::Adjacency => self.adjacency.read().contains_key(origin),
            AdvertisementType::Coordinate => self.coordinates.read().contains_key(origin),
            AdvertisementType::Name => false,
        }
    }

    fn topology(&self, kind: AdvertisementType) -> TopologyMap {
        let mut map = TopologyMap::empty(kind);
        match kind {
            AdvertisementType::Adjacency => {
                for (origin, neighbors) in self.adjacency.read().iter() {
                    map.routers.insert(origin.clone());
                    for (neighbor, cost) in neighbors {
                        map.routers.insert(neighbor.clone());
                        map.links.push(Link {
                            source: origin.clone(),
                            target: neighbor.clone(),
                            cost: *cost,
                        });
                    }
                }
            }
            AdvertisementType::Coordinate => {
                for (origin, coordinate) in self.coordinates.read().iter() {
                    map.routers.insert(origin.clone());
                    map.coordinates.insert(origin.clone(), coordinate.clone());
                }
            }
            AdvertisementType::Name => {}
        }
        map
    }
}
