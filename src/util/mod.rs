//! Utility functions and helpers.

mod clock;
mod timer;

pub use clock::*;
pub use timer::*;

use std::time::Duration;

/// Whole milliseconds of a duration, truncated.
pub fn whole_millis(d: Duration) -> f64 {
    d.as_millis() as f64
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation divided by the mean.
///
/// `None` for an empty slice or a non-positive mean.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(variance.max(0.0).sqrt() / m)
}

/// Average of a set of durations, `None` when empty.
pub fn average_duration<'a>(samples: impl IntoIterator<Item = &'a Duration>) -> Option<Duration> {
    let (sum, count) = samples
        .into_iter()
        .fold((Duration::ZERO, 0u32), |(sum, n), d| (sum + *d, n + 1));
    (count > 0).then(|| sum / count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_cv() {
        assert_eq!(mean(&[]), None);
        assert!((mean(&[10.0, 20.0, 30.0]).unwrap() - 20.0).abs() < 1e-9);

        let cv = coefficient_of_variation(&[10.0, 10.0, 10.0]).unwrap();
        assert!(cv.abs() < 1e-9);

        // stddev of [10, 30] is 10, mean 20
        let cv = coefficient_of_variation(&[10.0, 30.0]).unwrap();
        assert!((cv - 0.5).abs() < 1e-9);

        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), None);
    }

    #[test]
    fn test_average_duration() {
        let samples = [Duration::from_millis(40), Duration::from_millis(60)];
        assert_eq!(average_duration(&samples), Some(Duration::from_millis(50)));
        assert_eq!(average_duration(&[]), None);
        assert!((whole_millis(Duration::from_micros(2900)) - 2.0).abs() < f64::EPSILON);
    }
}
