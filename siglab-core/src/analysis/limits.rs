//! Warning limits: per-signal thresholds and violation intervals.
//!
//! Violations are strict: a sample exactly at `warning_min` or
//! `warning_max` is inside the band. A threshold of 0.0 is a valid
//! limit; disabling requires `enabled = false`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub warning_min: f64,
    pub warning_max: f64,
    pub enabled: bool,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            warning_min: 0.0,
            warning_max: 0.0,
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitSide {
    BelowMin,
    AboveMax,
}

/// One maximal run of consecutive violating samples on one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationInterval {
    pub side: LimitSide,
    pub start_index: usize,
    pub end_index: usize,
    pub start: f64,
    pub end: f64,
}

/// Compute violation intervals for one signal against its limits.
///
/// Output is sorted by start index; runs are merged per side, so a
/// stretch that dips below the minimum and a stretch that exceeds the
/// maximum are always separate intervals.
pub fn violations(x: &[f64], y: &[f64], config: &LimitConfig) -> Vec<ViolationInterval> {
    if !config.enabled || y.is_empty() {
        return Vec::new();
    }
    let n = x.len().min(y.len());

    let mut intervals = Vec::new();
    collect_runs(
        x,
        &mut intervals,
        LimitSide::BelowMin,
        (0..n).map(|i| y[i] < config.warning_min),
    );
    collect_runs(
        x,
        &mut intervals,
        LimitSide::AboveMax,
        (0..n).map(|i| y[i] > config.warning_max),
    );
    intervals.sort_by_key(|v| v.start_index);
    intervals
}

fn collect_runs(
    x: &[f64],
    out: &mut Vec<ViolationInterval>,
    side: LimitSide,
    mask: impl Iterator<Item = bool>,
) {
    let mut run_start: Option<usize> = None;
    let mut last = 0usize;
    for (i, hit) in mask.enumerate() {
        match (hit, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                out.push(interval(x, side, start, i - 1));
                run_start = None;
            }
            _ => {}
        }
        last = i;
    }
    if let Some(start) = run_start {
        out.push(interval(x, side, start, last));
    }
}

fn interval(x: &[f64], side: LimitSide, start: usize, end: usize) -> ViolationInterval {
    ViolationInterval {
        side,
        start_index: start,
        end_index: end,
        start: x[start],
        end: x[end],
    }
}
