//! # Svarog
//!
//! Adaptive link-cost estimation and routing decisions for link-state
//! routing daemons.
//!
//! Svarog measures round-trip times to every neighbor with lightweight
//! probes, turns them into bounded link costs, optionally remaps those costs
//! with a load-aware formula or an online-learned model, and serialises
//! routing table recalculation behind a single-flight schedule.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 RoutingDaemon (single tokio task)               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                     RoutingOrchestrator                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌───────────┐  ┌──────────┐  │
//! │  │ ML-adaptive │  │ load-aware  │  │link-state │  │hyperbolic│  │
//! │  └──────┬──────┘  └──────┬──────┘  └───────────┘  └──────────┘  │
//! │         │ cost transform │                                      │
//! ├─────────┴────────────────┴──────────────────────────────────────┤
//! │          LinkCostManager  ◀── performance feedback ──▶ model    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │            Probe face (TokioFace / UDP transport)               │
//! └─────────────────────────────────────────────────────────────────┘

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::cast_possible_truncation)]  // Millisecond conversions
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]       // Acceptable for stats
#![allow(clippy::suboptimal_flops)]          // Clarity over micro-optimization
#![allow(clippy::similar_names)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::use_self)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::float_cmp)]                 // Costs compared to configured values
#![allow(clippy::match_same_arms)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::ignored_unit_patterns)]

pub mod adaptive;
pub mod config;
pub mod daemon;
pub mod error;
pub mod linkcost;
pub mod probe;
pub mod routing;
pub mod types;
pub mod util;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adaptive::{AdaptiveCostModel, SharedCostModel};
    pub use crate::config::Config;
    pub use crate::daemon::{DaemonChannels, RoutingDaemon};
    pub use crate::error::{Error, Result};
    pub use crate::linkcost::{LinkCostManager, LinkMetrics, NeighborEvent, SharedLinkCostManager};
    pub use crate::probe::{Face, ProbeOutcome, ProbeResponder, Signer, TokioFace, UdpProbeTransport};
    pub use crate::routing::{
        AdjacencyTable, CalculationSchedule, LsdbUpdate, PathCalculator, RoutingOrchestrator,
        RoutingTableSnapshot, TopologyDatabase,
    };
    pub use crate::types::*;
    pub use crate::util::{Clock, SharedClock, SystemClock};
}
