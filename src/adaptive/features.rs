//! Feature extraction from a neighbor's mirrored RTT samples.

use crate::util::{coefficient_of_variation, mean};

/// Number of model inputs.
pub const FEATURE_COUNT: usize = 5;

/// Model inputs, each clamped to its own range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    /// Latest 5 vs previous 5 samples, in `[-1, 1]`.
    pub rtt_trend: f64,
    /// Coefficient of variation, in `[0, 1]`.
    pub rtt_variation: f64,
    /// Fraction of samples under the success threshold, in `[0, 1]`.
    pub success_rate: f64,
    /// Normalised second difference of the latest samples, in `[-1, 1]`.
    pub load_indicator: f64,
    /// Historical performance of the current time slot, in `[0, 1]`.
    pub temporal: f64,
}

impl FeatureVector {
    /// Extract features from RTT samples in milliseconds, oldest first.
    pub fn extract(rtt_ms: &[f64], success_threshold_ms: f64, temporal: f64) -> Self {
        Self {
            rtt_trend: rtt_trend(rtt_ms),
            rtt_variation: rtt_variation(rtt_ms),
            success_rate: success_rate(rtt_ms, success_threshold_ms),
            load_indicator: load_indicator(rtt_ms),
            temporal: temporal.clamp(0.0, 1.0),
        }
    }

    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.rtt_trend,
            self.rtt_variation,
            self.success_rate,
            self.load_indicator,
            self.temporal,
        ]
    }
}

fn rtt_trend(rtt_ms: &[f64]) -> f64 {
    let n = rtt_ms.len();
    if n < 10 {
        return 0.0;
    }
    let recent = mean(&rtt_ms[n - 5..]).unwrap_or(0.0);
    let old = mean(&rtt_ms[n - 10..n - 5]).unwrap_or(0.0);
    if old > 0.0 {
        (recent / old - 1.0).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fn rtt_variation(rtt_ms: &[f64]) -> f64 {
    if rtt_ms.len() < 3 {
        return 0.0;
    }
    // Non-positive mean is treated as maximally unstable.
    coefficient_of_variation(rtt_ms).map_or(1.0, |cv| cv.min(1.0))
}

fn success_rate(rtt_ms: &[f64], threshold_ms: f64) -> f64 {
    if rtt_ms.is_empty() {
        return 0.5;
    }
    rtt_ms.iter().filter(|rtt| **rtt < threshold_ms).count() as f64 / rtt_ms.len() as f64
}

fn load_indicator(rtt_ms: &[f64]) -> f64 {
    let n = rtt_ms.len();
    if n < 5 {
        return 0.0;
    }
    let (old, middle, recent) = (rtt_ms[n - 3], rtt_ms[n - 2], rtt_ms[n - 1]);
    let acceleration = (recent - middle) - (middle - old);
    (acceleration / 100.0).clamp(-1.0, 1.0)
}
