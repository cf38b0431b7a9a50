//! Real-time link performance score.
//!
//! Four sub-scores in `[0, 1]`, lower is better, blended into one value that
//! feeds the online model as its training target.

use std::time::Duration;

use crate::util::{coefficient_of_variation, whole_millis};

pub const RTT_WEIGHT: f64 = 0.4;
pub const STABILITY_WEIGHT: f64 = 0.25;
pub const RELIABILITY_WEIGHT: f64 = 0.2;
pub const TREND_WEIGHT: f64 = 0.15;

const RTT_EXCELLENT_MS: f64 = 10.0;
const RTT_GOOD_MS: f64 = 50.0;
const RTT_FAIR_MS: f64 = 100.0;
const RTT_POOR_MS: f64 = 200.0;

/// Window used by the stability score.
const STABILITY_WINDOW: usize = 5;

/// Piecewise-linear latency score.
pub fn rtt_score(rtt_ms: f64) -> f64 {
    if rtt_ms <= RTT_EXCELLENT_MS {
        0.0
    } else if rtt_ms <= RTT_GOOD_MS {
        (rtt_ms - RTT_EXCELLENT_MS) / (RTT_GOOD_MS - RTT_EXCELLENT_MS) * 0.3
    } else if rtt_ms <= RTT_FAIR_MS {
        0.3 + (rtt_ms - RTT_GOOD_MS) / (RTT_FAIR_MS - RTT_GOOD_MS) * 0.3
    } else if rtt_ms <= RTT_POOR_MS {
        0.6 + (rtt_ms - RTT_FAIR_MS) / (RTT_POOR_MS - RTT_FAIR_MS) * 0.3
    } else {
        0.9 + f64::min(0.1, (rtt_ms - RTT_POOR_MS) / 800.0 * 0.1)
    }
}

/// Coefficient of variation over the latest samples.
pub fn stability_score(history: &[Duration]) -> f64 {
    if history.len() < 3 {
        return 0.5;
    }
    let window: Vec<f64> = history[history.len().saturating_sub(STABILITY_WINDOW)..]
        .iter()
        .map(|d| whole_millis(*d))
        .collect();
    let cv = coefficient_of_variation(&window).unwrap_or(0.0);

    if cv <= 0.1 {
        0.0
    } else if cv <= 0.3 {
        cv / 0.3 * 0.4
    } else {
        0.4 + f64::min(0.6, (cv - 0.3) / 0.7 * 0.6)
    }
}

/// Step function of the hello timeout count.
pub fn reliability_score(timeouts: u32) -> f64 {
    match timeouts {
        0 => 0.0,
        1..=2 => 0.2,
        3..=5 => 0.5,
        _ => 0.8,
    }
}

/// Latest three samples against the three before them.
pub fn trend_score(history: &[Duration]) -> f64 {
    let n = history.len();
    if n < 6 {
        return 0.0;
    }
    let avg = |slice: &[Duration]| slice.iter().map(|d| whole_millis(*d)).sum::<f64>() / 3.0;
    let recent = avg(&history[n - 3..]);
    let previous = avg(&history[n - 6..n - 3]);
    if previous <= 0.0 {
        return 0.0;
    }

    let change = (recent - previous) / previous;
    if change <= -0.1 {
        0.0
    } else if change <= 0.1 {
        0.2
    } else if change <= 0.3 {
        0.5
    } else {
        0.8
    }
}

/// Weighted blend of all sub-scores, clamped to `[0, 1]`.
pub fn performance_score(latest_rtt: Duration, history: &[Duration], timeouts: u32) -> f64 {
    let total = RTT_WEIGHT * rtt_score(whole_millis(latest_rtt))
        + STABILITY_WEIGHT * stability_score(history)
        + RELIABILITY_WEIGHT * reliability_score(timeouts)
        + TREND_WEIGHT * trend_score(history);
    total.clamp(0.0, 1.0)
}
