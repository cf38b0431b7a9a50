//! Online linear model.

use super::features::{FeatureVector, FEATURE_COUNT};

/// Initial weights, ordered like [`FeatureVector::as_array`].
pub const HEURISTIC_WEIGHTS: [f64; FEATURE_COUNT] = [0.4, 0.3, 0.2, 0.1, 0.15];

/// Weights used until the model has been trained at least once.
pub const FALLBACK_WEIGHTS: [f64; 4] = [0.4, 0.3, 0.2, 0.1];

/// Logistic regression over the link features, trained by single SGD steps.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    weights: [f64; FEATURE_COUNT],
    bias: f64,
    update_count: u64,
}

impl Default for LinearModel {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl LinearModel {
    pub fn heuristic() -> Self {
        Self {
            weights: HEURISTIC_WEIGHTS,
            bias: 0.0,
            update_count: 0,
        }
    }

    /// Sigmoid of the weighted sum; always in `(0, 1)`.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let z = self.bias
            + self
                .weights
                .iter()
                .zip(features.as_array())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }

    /// One gradient step towards `target`.
    pub fn update(&mut self, features: &FeatureVector, target: f64, learning_rate: f64) {
        let error = target - self.predict(features);
        self.bias += learning_rate * error;
        for (w, x) in self.weights.iter_mut().zip(features.as_array()) {
            *w += learning_rate * error * x;
        }
        self.update_count += 1;
    }

    pub fn weights(&self) -> &[f64; FEATURE_COUNT] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}

/// Fixed-weight score over the first four features, clamped to `[0, 1]`.
pub fn fallback_score(features: &FeatureVector) -> f64 {
    FALLBACK_WEIGHTS
        .iter()
        .zip(features.as_array())
        .map(|(w, x)| w * x)
        .sum::<f64>()
        .clamp(0.0, 1.0)
}
