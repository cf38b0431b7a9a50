//! Adaptive cost model: feature extraction, prediction and online learning.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::features::FeatureVector;
use super::model::{fallback_score, LinearModel};
use super::temporal::TemporalPatterns;
use crate::config::AdaptiveConfig;
use crate::linkcost::LinkMetrics;
use crate::types::Name;
use crate::util::{mean, whole_millis, SharedClock};

/// Model handle shared between the routing strategy and the cost hooks.
pub type SharedCostModel = Arc<Mutex<AdaptiveCostModel>>;

/// Rolling error above which learning speeds up.
const HIGH_ERROR: f64 = 0.3;
/// Rolling error below which learning slows down.
const LOW_ERROR: f64 = 0.1;

/// Rule-based link category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl LinkQuality {
    pub fn classify(features: &FeatureVector) -> Self {
        let (trend, variation, success) = (
            features.rtt_trend,
            features.rtt_variation,
            features.success_rate,
        );
        if trend < 0.1 && variation < 0.2 && success > 0.8 {
            LinkQuality::Excellent
        } else if trend < 0.3 && variation < 0.4 && success > 0.6 {
            LinkQuality::Good
        } else if trend < 0.6 && success > 0.4 {
            LinkQuality::Fair
        } else {
            LinkQuality::Poor
        }
    }
}

impl fmt::Display for LinkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkQuality::Excellent => write!(f, "excellent"),
            LinkQuality::Good => write!(f, "good"),
            LinkQuality::Fair => write!(f, "fair"),
            LinkQuality::Poor => write!(f, "poor"),
        }
    }
}

/// Learning counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModelStatistics {
    pub prediction_count: u64,
    pub model_update_count: u64,
    pub pattern_update_count: u64,
    /// Mean absolute error over the recent error window.
    pub average_prediction_error: f64,
}

/// Prediction paired with the performance that was later observed.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceRecord {
    pub predicted: f64,
    pub actual: f64,
    pub timestamp: Instant,
}

/// Learns neighbor metrics → cost multiplier online.
pub struct AdaptiveCostModel {
    config: AdaptiveConfig,
    clock: SharedClock,
    model: LinearModel,
    patterns: TemporalPatterns,
    rtt_mirror: HashMap<Name, VecDeque<f64>>,
    performance: HashMap<Name, VecDeque<PerformanceRecord>>,
    recent_errors: VecDeque<f64>,
    learning_rate: f64,
    ready: bool,
    last_update: Instant,
    stats: ModelStatistics,
}

impl AdaptiveCostModel {
    pub fn new(config: AdaptiveConfig, clock: SharedClock) -> Self {
        let last_update = clock.now();
        Self {
            learning_rate: config.learning_rate,
            patterns: TemporalPatterns::new(config.temporal_alpha),
            recent_errors: VecDeque::with_capacity(config.error_window),
            config,
            clock,
            model: LinearModel::heuristic(),
            rtt_mirror: HashMap::new(),
            performance: HashMap::new(),
            ready: false,
            last_update,
            stats: ModelStatistics::default(),
        }
    }

    pub fn into_shared(self) -> SharedCostModel {
        Arc::new(Mutex::new(self))
    }

    /// Current features of `neighbor`.
    pub fn extract_features(&self, neighbor: &Name) -> FeatureVector {
        let temporal = self.patterns.feature(neighbor, self.clock.minute_of_day());
        let mirror: Vec<f64> = self
            .rtt_mirror
            .get(neighbor)
            .map(|samples| samples.iter().copied().collect())
            .unwrap_or_default();
        FeatureVector::extract(&mirror, self.config.success_rtt_ms, temporal)
    }

    /// Quality score in `[0, 1]`; fixed weights until the model has trained.
    pub fn score(&self, features: &FeatureVector) -> f64 {
        if self.ready {
            self.model.predict(features)
        } else {
            fallback_score(features)
        }
    }

    /// Predicted cost for `neighbor`: `original × (1 + score)`.
    pub fn predict_link_cost(&mut self, neighbor: &Name, metrics: &LinkMetrics) -> f64 {
        let features = self.extract_features(neighbor);
        let score = self.score(&features);
        let cost = metrics.original_cost * (1.0 + score);
        self.stats.prediction_count += 1;

        if let Some(rtt) = metrics.current_rtt {
            let capacity = self.config.rtt_mirror_capacity;
            let mirror = self.rtt_mirror.entry(neighbor.clone()).or_default();
            mirror.push_back(whole_millis(rtt));
            while mirror.len() > capacity {
                mirror.pop_front();
            }
        }

        tracing::trace!(
            neighbor = %neighbor,
            features = ?features.as_array(),
            quality = %LinkQuality::classify(&features),
            score,
            cost,
            "Model prediction"
        );
        cost
    }

    /// Learn from an observed performance score (lower is better).
    pub fn report_path_performance(&mut self, neighbor: &Name, actual: f64) {
        let now = self.clock.now();
        let features = self.extract_features(neighbor);

        self.patterns
            .update(neighbor, self.clock.minute_of_day(), actual, now);
        self.stats.pattern_update_count += 1;

        self.update_with_feedback(neighbor, &features, actual, now);

        let record = PerformanceRecord {
            predicted: self.model.predict(&features),
            actual,
            timestamp: now,
        };
        tracing::debug!(
            neighbor = %neighbor,
            predicted = record.predicted,
            actual,
            "Performance feedback"
        );
        let capacity = self.config.performance_history_capacity;
        let history = self.performance.entry(neighbor.clone()).or_default();
        history.push_back(record);
        while history.len() > capacity {
            history.pop_front();
        }
    }

    fn update_with_feedback(
        &mut self,
        neighbor: &Name,
        features: &FeatureVector,
        actual: f64,
        now: Instant,
    ) {
        let error = (actual - self.model.predict(features)).abs();
        self.recent_errors.push_back(error);
        while self.recent_errors.len() > self.config.error_window {
            self.recent_errors.pop_front();
        }
        let errors: Vec<f64> = self.recent_errors.iter().copied().collect();
        self.stats.average_prediction_error = mean(&errors).unwrap_or(error);

        if !self.should_update(error, now) {
            return;
        }

        self.adapt_learning_rate();
        self.model.update(features, actual, self.learning_rate);
        self.stats.model_update_count += 1;
        self.last_update = now;
        self.ready = true;

        tracing::debug!(
            neighbor = %neighbor,
            error,
            learning_rate = self.learning_rate,
            "Model updated"
        );
    }

    fn should_update(&self, error: f64, now: Instant) -> bool {
        error > self.config.adaptation_threshold
            || now.saturating_duration_since(self.last_update) > self.config.refresh_interval
    }

    fn adapt_learning_rate(&mut self) {
        let average = self.stats.average_prediction_error;
        if average > HIGH_ERROR {
            self.learning_rate = (self.learning_rate * 1.1).min(self.config.max_learning_rate);
        } else if average < LOW_ERROR {
            self.learning_rate = (self.learning_rate * 0.9).max(self.config.min_learning_rate);
        }
    }

    pub fn statistics(&self) -> ModelStatistics {
        self.stats
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Whether the model has been trained at least once.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    pub fn patterns(&self) -> &TemporalPatterns {
        &self.patterns
    }

    pub fn performance_history(&self, neighbor: &Name) -> Vec<PerformanceRecord> {
        self.performance
            .get(neighbor)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn mirrored_rtts(&self, neighbor: &Name) -> Vec<f64> {
        self.rtt_mirror
            .get(neighbor)
            .map(|samples| samples.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for AdaptiveCostModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveCostModel")
            .field("ready", &self.ready)
            .field("learning_rate", &self.learning_rate)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
