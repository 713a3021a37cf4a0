//! Statistics engine: vectorized per-signal descriptive statistics with
//! optional cursor/range scoping and duty-cycle measurement.
//!
//! Numeric policy: every division is guarded; a statistic that is
//! undefined for the given sample count is `None`, never NaN.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::signal::registry::SignalRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DutyCycleMode {
    /// Threshold is the scoped mean.
    Auto,
    /// Threshold is a caller-supplied value.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub rms: f64,
    pub peak_to_peak: f64,
    pub q25: Option<f64>,
    pub q75: Option<f64>,
    pub iqr: Option<f64>,
    pub duty_cycle_percent: f64,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub sample_rate: Option<f64>,
    pub duration: Option<f64>,
}

/// Statistics for one series. `None` when the series is empty.
pub fn signal_stats(
    x: &[f64],
    y: &[f64],
    duty_mode: DutyCycleMode,
    duty_value: f64,
) -> Option<SignalStats> {
    let n = y.len().min(x.len());
    if n == 0 {
        return None;
    }
    let y = &y[..n];
    let x = &x[..n];

    let nf = n as f64;
    let mean = y.iter().sum::<f64>() / nf;
    let var = y.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / nf;
    let std = var.sqrt();
    let min = y.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let rms = (y.iter().map(|v| v * v).sum::<f64>() / nf).sqrt();

    let mut sorted = y.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = percentile(&sorted, 50.0);

    let (q25, q75, iqr) = if n > 1 {
        let q25 = percentile(&sorted, 25.0);
        let q75 = percentile(&sorted, 75.0);
        (Some(q25), Some(q75), Some(q75 - q25))
    } else {
        (None, None, None)
    };

    let duty_cycle_percent = if n > 1 {
        let threshold = match duty_mode {
            DutyCycleMode::Auto => mean,
            DutyCycleMode::Manual => duty_value,
        };
        duty_cycle(x, y, threshold)
    } else {
        0.0
    };

    let (skewness, kurtosis) = if n > 10 && std > 0.0 {
        let m3 = y.iter().map(|v| ((v - mean) / std).powi(3)).sum::<f64>() / nf;
        let m4 = y.iter().map(|v| ((v - mean) / std).powi(4)).sum::<f64>() / nf;
        (Some(m3), Some(m4 - 3.0))
    } else {
        (None, None)
    };

    let (sample_rate, duration) = if n > 1 {
        let mean_dt = (x[n - 1] - x[0]) / (nf - 1.0);
        let rate = if mean_dt > 0.0 {
            Some(1.0 / mean_dt)
        } else {
            None
        };
        (rate, Some(x[n - 1] - x[0]))
    } else {
        (None, None)
    };

    Some(SignalStats {
        count: n,
        mean,
        std,
        min,
        max,
        median,
        rms,
        peak_to_peak: max - min,
        q25,
        q75,
        iqr,
        duty_cycle_percent,
        skewness,
        kurtosis,
        sample_rate,
        duration,
    })
}

/// Compute statistics for the named signals (all when `None`), optionally
/// scoped to samples with `x ∈ [start, end]`.
///
/// Signals with no samples in the scope are omitted: an empty time range
/// yields an empty map, not a zero-filled one.
pub fn compute(
    registry: &SignalRegistry,
    names: Option<&[String]>,
    time_range: Option<(f64, f64)>,
    duty_mode: DutyCycleMode,
    duty_value: f64,
) -> HashMap<String, SignalStats> {
    let targets: Vec<String> = match names {
        Some(names) => names.to_vec(),
        None => registry.list(),
    };

    let mut results = HashMap::new();
    for name in targets {
        let Some(signal) = registry.get(&name) else {
            continue;
        };
        let stats = match time_range {
            Some((start, end)) => {
                let lo = signal.x.partition_point(|&v| v < start);
                let hi = signal.x.partition_point(|&v| v <= end);
                if lo >= hi {
                    continue;
                }
                signal_stats(&signal.x[lo..hi], &signal.y[lo..hi], duty_mode, duty_value)
            }
            None => signal_stats(&signal.x, &signal.y, duty_mode, duty_value),
        };
        if let Some(stats) = stats {
            results.insert(name, stats);
        }
    }
    results
}

/// Linear-interpolated percentile over a sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = q / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;
    if lo + 1 >= n {
        return sorted[n - 1];
    }
    sorted[lo] * (1.0 - frac) + sorted[lo + 1] * frac
}

/// Percent of total duration spent above the threshold, accumulated by
/// walking threshold crossings. Zero when the duration is zero.
fn duty_cycle(x: &[f64], y: &[f64], threshold: f64) -> f64 {
    let n = x.len();
    let total = x[n - 1] - x[0];
    if total <= 0.0 {
        return 0.0;
    }

    let mut high_time = 0.0;
    let mut is_high = y[0] > threshold;
    let mut last_cross = x[0];

    for i in 1..n {
        let now_high = y[i] > threshold;
        if now_high != is_high {
            // Crossing attributed to the sample before the transition.
            let cross_time = x[i - 1];
            if is_high {
                high_time += cross_time - last_cross;
            }
            is_high = now_high;
            last_cross = cross_time;
        }
    }
    if is_high {
        high_time += x[n - 1] - last_cross;
    }

    (high_time / total) * 100.0
}
