//! Built-in path calculators.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use petgraph::algo::dijkstra;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::table::{NextHop, RoutingTableEntry};
use super::topology::{AdjacencyTable, Coordinate, PathCalculator, TopologyMap};
use crate::types::{LinkStatus, Name};

/// Directed cost graph over the routers and links of a topology map.
struct CostGraph {
    graph: DiGraph<Name, f64>,
    index: BTreeMap<Name, NodeIndex>,
}

impl CostGraph {
    fn build(map: &TopologyMap) -> Self {
        let mut graph = DiGraph::new();
        let mut index = BTreeMap::new();
        let mut node = |graph: &mut DiGraph<Name, f64>, name: &Name| {
            *index
                .entry(name.clone())
                .or_insert_with(|| graph.add_node(name.clone()))
        };

        for router in &map.routers {
            node(&mut graph, router);
        }
        for link in map.links.iter().filter(|link| link.cost >= 0.0) {
            let source = node(&mut graph, &link.source);
            let target = node(&mut graph, &link.target);
            graph.add_edge(source, target, link.cost);
        }
        Self { graph, index }
    }

    /// First hop on a shortest path for every router reachable from `start`.
    ///
    /// A router's first hop is inherited from a predecessor lying on one of
    /// its shortest paths; ties go to the lowest neighbor name.
    fn first_hops(
        &self,
        start: NodeIndex,
        distances: &HashMap<NodeIndex, f64>,
    ) -> HashMap<NodeIndex, NodeIndex> {
        let mut order: Vec<(NodeIndex, f64)> = distances
            .iter()
            .filter(|(node, _)| **node != start)
            .map(|(node, distance)| (*node, *distance))
            .collect();
        order.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| self.graph[a.0].cmp(&self.graph[b.0]))
        });

        let mut hops: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        // zero-cost links can order a router before its predecessor
        loop {
            let mut progressed = false;
            for &(node, distance) in &order {
                if hops.contains_key(&node) {
                    continue;
                }
                let hop = self
                    .graph
                    .edges_directed(node, Direction::Incoming)
                    .filter_map(|edge| {
                        let from = edge.source();
                        if distances.get(&from)? + edge.weight() != distance {
                            return None;
                        }
                        if from == start {
                            Some(node)
                        } else {
                            hops.get(&from).copied()
                        }
                    })
                    .min_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
                if let Some(hop) = hop {
                    hops.insert(node, hop);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        hops
    }
}

/// Dijkstra over adjacency links; one next hop per destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStateCalculator;

impl PathCalculator for LinkStateCalculator {
    fn calculate(&self, source: &Name, map: &TopologyMap) -> Vec<RoutingTableEntry> {
        let costs = CostGraph::build(map);
        let Some(&start) = costs.index.get(source) else {
            return Vec::new();
        };

        let distances = dijkstra(&costs.graph, start, None, |edge| *edge.weight());
        let hops = costs.first_hops(start, &distances);

        let mut entries: Vec<RoutingTableEntry> = hops
            .into_iter()
            .map(|(destination, hop)| RoutingTableEntry {
                destination: costs.graph[destination].clone(),
                next_hops: vec![NextHop {
                    neighbor: costs.graph[hop].clone(),
                    cost: distances[&destination],
                }],
            })
            .collect();
        entries.sort_by(|a, b| a.destination.cmp(&b.destination));
        entries
    }
}

/// Greedy hyperbolic forwarding: every active neighbor with coordinates is a
/// next hop, costed by its hyperbolic distance to the destination.
pub struct HyperbolicCalculator {
    adjacencies: Arc<dyn AdjacencyTable>,
}

impl HyperbolicCalculator {
    pub fn new(adjacencies: Arc<dyn AdjacencyTable>) -> Self {
        Self { adjacencies }
    }
}

impl std::fmt::Debug for HyperbolicCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperbolicCalculator").finish_non_exhaustive()
    }
}

impl PathCalculator for HyperbolicCalculator {
    fn calculate(&self, source: &Name, map: &TopologyMap) -> Vec<RoutingTableEntry> {
        let neighbors: Vec<(Name, &Coordinate)> = self
            .adjacencies
            .adjacencies()
            .into_iter()
            .filter(|adjacency| adjacency.status == LinkStatus::Active)
            .filter_map(|adjacency| {
                map.coordinates
                    .get(&adjacency.name)
                    .map(|coordinate| (adjacency.name, coordinate))
            })
            .collect();

        map.coordinates
            .iter()
            .filter(|(destination, _)| *destination != source)
            .filter_map(|(destination, target)| {
                let mut entry = RoutingTableEntry::new(destination.clone());
                for (neighbor, position) in &neighbors {
                    let cost = if neighbor == destination {
                        0.0
                    } else {
                        hyperbolic_distance(position, target)
                    };
                    if cost.is_finite() {
                        entry.add_next_hop(NextHop {
                            neighbor: neighbor.clone(),
                            cost,
                        });
                    }
                }
                (!entry.next_hops.is_empty()).then_some(entry)
            })
            .collect()
    }
}

/// Distance in the native representation of the hyperbolic plane
/// (generalised to hyperspherical angles).
pub fn hyperbolic_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    if a.angles.len() != b.angles.len() || a.angles.is_empty() {
        return f64::NAN;
    }
    let delta = angular_distance(&a.angles, &b.angles);
    if delta == 0.0 {
        return (a.radius - b.radius).abs();
    }
    let cosh = a.radius.cosh() * b.radius.cosh()
        - a.radius.sinh() * b.radius.sinh() * delta.cos();
    cosh.max(1.0).acosh()
}

fn angular_distance(a: &[f64], b: &[f64]) -> f64 {
    let (x, y) = (unit_vector(a), unit_vector(b));
    let dot: f64 = x.iter().zip(&y).map(|(p, q)| p * q).sum();
    dot.clamp(-1.0, 1.0).acos()
}

fn unit_vector(angles: &[f64]) -> Vec<f64> {
    let mut vector = Vec::with_capacity(angles.len() + 1);
    let mut sines = 1.0;
    for angle in angles {
        vector.push(sines * angle.cos());
        sines *= angle.sin();
    }
    vector.push(sines);
    vector
}
