use serde::{Deserialize, Serialize};
use tracing::debug;

use super::safe_number;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightProgress {
    pub current: f64,
    pub target: f64,
    pub remaining: f64,
    /// Share of the start-to-target distance already covered, in [0, 100].
    pub percentage: f64,
}

/// Progress from `start` towards `target` given the `current` weight.
///
/// Without a tracked start weight the current weight stands in for it, which
/// always reports 0% covered.
pub fn weight_progress(start: Option<f64>, current: f64, target: f64) -> WeightProgress {
    let current = safe_number(current, 0.0);
    let target = safe_number(target, 0.0);
    let start = match start.filter(|s| s.is_finite()) {
        Some(s) => s,
        None => {
            debug!("no start weight tracked, progress measured from current weight");
            current
        }
    };

    let total = (start - target).abs();
    let remaining = (current - target).abs();
    let lost = total - remaining;
    let percentage = if total > 0.0 {
        safe_number(lost / total * 100.0, 0.0)
    } else {
        0.0
    };

    WeightProgress {
        current,
        target,
        remaining,
        percentage: percentage.clamp(0.0, 100.0),
    }
}

/// Least-squares slope of weight against day index (kg per sample step).
///
/// Returns 0.0 for fewer than two samples or a degenerate fit.
pub fn weight_trend(weights: &[f64]) -> f64 {
    if weights.len() < 2 {
        return 0.0;
    }
    let n = weights.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for (i, &y) in weights.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }
    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    safe_number((n * sum_xy - sum_x * sum_y) / denominator, 0.0)
}
