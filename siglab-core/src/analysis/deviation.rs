//! Deviation analysis: trend line, rolling bands, fluctuation alerts,
//! and red segments (contiguous threshold exceedances).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub enabled: bool,
    /// 1 = heaviest smoothing, 5 = lightest.
    pub sensitivity: u8,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sensitivity: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluctuationConfig {
    pub enabled: bool,
    pub window_samples: usize,
    pub threshold_percent: f64,
    pub highlight: bool,
    pub red_highlight: bool,
}

impl Default for FluctuationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_samples: 20,
            threshold_percent: 5.0,
            highlight: true,
            red_highlight: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub enabled: bool,
    /// Fill transparency percentage for the renderer.
    pub transparency: u8,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transparency: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviationConfig {
    pub trend: TrendConfig,
    pub fluctuation: FluctuationConfig,
    pub bands: BandConfig,
    pub selected_parameters: Vec<String>,
}

/// One sample whose short-term deviation exceeded the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluctuationAlert {
    pub index: usize,
    pub value: f64,
    pub expected: f64,
    pub deviation_percent: f64,
}

/// Maximal run of consecutive alert indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedSegment {
    pub start_index: usize,
    pub end_index: usize,
    pub peak_deviation_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bands {
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviationResult {
    pub trend_line: Vec<f64>,
    pub bands: Bands,
    pub alerts: Vec<FluctuationAlert>,
    pub red_segments: Vec<RedSegment>,
}

/// Least-squares line over (index, y), smoothed by a centered moving
/// average whose window shrinks as sensitivity rises.
pub fn trend_line(y: &[f64], sensitivity: u8) -> Vec<f64> {
    let n = y.len();
    if n < 2 {
        return y.to_vec();
    }

    // Fit y = a*i + b.
    let nf = n as f64;
    let sum_i = (nf - 1.0) * nf / 2.0;
    let sum_ii = (nf - 1.0) * nf * (2.0 * nf - 1.0) / 6.0;
    let sum_y: f64 = y.iter().sum();
    let sum_iy: f64 = y.iter().enumerate().map(|(i, v)| i as f64 * v).sum();
    let denom = nf * sum_ii - sum_i * sum_i;
    let (a, b) = if denom == 0.0 {
        (0.0, sum_y / nf)
    } else {
        let a = (nf * sum_iy - sum_i * sum_y) / denom;
        (a, (sum_y - a * sum_i) / nf)
    };
    let fitted: Vec<f64> = (0..n).map(|i| a * i as f64 + b).collect();

    let window = smoothing_window(n, sensitivity);
    if window <= 1 {
        return fitted;
    }

    // Centered moving average with clamped edge windows.
    let half = window / 2;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            fitted[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

fn smoothing_window(n: usize, sensitivity: u8) -> usize {
    match sensitivity.clamp(1, 5) {
        1 | 2 => (n / 4).min(20),
        4 | 5 => (n / 10).min(5),
        _ => (n / 8).min(10),
    }
}

/// Rolling bands around the trailing-window mean:
/// upper/lower = mean * (1 ± p/100). Empty when `n < window`.
pub fn rolling_bands(y: &[f64], window: usize, threshold_percent: f64) -> Bands {
    let n = y.len();
    if window == 0 || n < window {
        return Bands::default();
    }

    let mut upper = Vec::with_capacity(n);
    let mut lower = Vec::with_capacity(n);
    for i in 0..n {
        let lo = (i + 1).saturating_sub(window);
        let slice = &y[lo..=i];
        let mean = slice.iter().sum::<f64>() / slice.len() as f64;
        let delta = mean * (threshold_percent / 100.0);
        upper.push(mean + delta);
        lower.push(mean - delta);
    }
    Bands { upper, lower }
}

/// Scan for samples deviating from the mean of the preceding window by
/// more than the threshold. A zero window mean makes the deviation
/// undefined: it is recorded as 0% and never alerts.
pub fn detect_fluctuations(
    y: &[f64],
    window: usize,
    threshold_percent: f64,
) -> Vec<FluctuationAlert> {
    let n = y.len();
    let mut alerts = Vec::new();
    if window == 0 || n < window {
        return alerts;
    }

    for i in window..n {
        let slice = &y[i - window..i];
        let mean = slice.iter().sum::<f64>() / window as f64;
        if mean == 0.0 {
            continue;
        }
        let deviation_percent = ((y[i] - mean) / mean).abs() * 100.0;
        if deviation_percent > threshold_percent {
            alerts.push(FluctuationAlert {
                index: i,
                value: y[i],
                expected: mean,
                deviation_percent,
            });
        }
    }
    alerts
}

/// Merge consecutive alert indices into maximal runs.
pub fn red_segments(alerts: &[FluctuationAlert]) -> Vec<RedSegment> {
    let mut segments: Vec<RedSegment> = Vec::new();
    for alert in alerts {
        match segments.last_mut() {
            Some(seg) if alert.index == seg.end_index + 1 => {
                seg.end_index = alert.index;
                seg.peak_deviation_percent =
                    seg.peak_deviation_percent.max(alert.deviation_percent);
            }
            _ => segments.push(RedSegment {
                start_index: alert.index,
                end_index: alert.index,
                peak_deviation_percent: alert.deviation_percent,
            }),
        }
    }
    segments
}

/// Run every enabled analysis for one signal.
pub fn analyze(y: &[f64], config: &DeviationConfig) -> DeviationResult {
    let mut result = DeviationResult::default();
    if y.is_empty() {
        return result;
    }

    if config.trend.enabled {
        result.trend_line = trend_line(y, config.trend.sensitivity);
    }
    if config.fluctuation.enabled {
        result.alerts = detect_fluctuations(
            y,
            config.fluctuation.window_samples,
            config.fluctuation.threshold_percent,
        );
        if config.fluctuation.red_highlight {
            result.red_segments = red_segments(&result.alerts);
        }
    }
    if config.bands.enabled {
        result.bands = rolling_bands(
            y,
            config.fluctuation.window_samples,
            config.fluctuation.threshold_percent,
        );
    }
    result
}
