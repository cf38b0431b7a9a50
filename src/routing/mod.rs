//! Routing decisions.
//!
//! ```text
//!   LsdbUpdate ──▶ RoutingOrchestrator ──▶ CalculationSchedule (single flight)
//!                        │
//!                        ├── ML-adaptive ─┐
//!                        ├── load-aware ──┼──▶ link-state calculator ──▶ RoutingTable
//!                        ├── link-state ──┘                                  │
//!                        └── hyperbolic (dry-run / on)                       ▼
//!                                                               broadcast<RoutingTableSnapshot>
//! ```

mod calculator;
mod orchestrator;
mod schedule;
mod strategy;
mod table;
mod topology;

pub use calculator::{hyperbolic_distance, HyperbolicCalculator, LinkStateCalculator};
pub use orchestrator::RoutingOrchestrator;
pub use schedule::CalculationSchedule;
pub use strategy::{
    AdaptiveStrategy, LoadAwareCalculator, MlAdaptiveCalculator, LOAD_AWARE_HISTORY,
    MIN_COST_CHANGE_RATIO, MIN_UPDATE_SPACING,
};
pub use table::{NextHop, RoutingTable, RoutingTableEntry, RoutingTableSnapshot};
pub use topology::{
    Adjacency, AdjacencyTable, Coordinate, InMemoryAdjacencyTable, InMemoryTopologyDatabase, Link,
    LsdbUpdate, LsdbUpdateKind, PathCalculator, TopologyDatabase, TopologyMap,
};
