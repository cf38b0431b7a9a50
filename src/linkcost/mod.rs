//! RTT-driven link cost estimation.

mod manager;
pub mod performance;
mod state;

pub use manager::{
    CostTransform, LinkCostManager, LinkCostStats, NeighborEvent, PerformanceFeedback,
    SharedLinkCostManager,
};
pub use state::{LinkMetrics, NeighborLinkState};
