//! Online-learned link cost model.
//!
//! ```text
//!   LinkMetrics ──▶ features ──▶ LinearModel ──▶ score ──▶ original × (1 + score)
//!                      ▲                ▲
//!   RTT mirror ────────┘                │ SGD step on large error or stale model
//!   time-slot EMA ◀── performance feedback
//! ```

pub mod features;
pub mod model;
mod predictor;
pub mod temporal;

pub use features::{FeatureVector, FEATURE_COUNT};
pub use model::LinearModel;
pub use predictor::{
    AdaptiveCostModel, LinkQuality, ModelStatistics, PerformanceRecord, SharedCostModel,
};
pub use temporal::{TemporalPatterns, TimeSlot};
