//! Vectorized normalization kernels.
//!
//! Every method degrades to an identity copy when its scale factor is
//! zero (flat or empty data), so normalization never divides by zero and
//! never produces non-finite output from finite input.

use crate::signal::NormalizationState;

pub fn normalize(data: &[f64], method: NormalizationState) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    match method {
        NormalizationState::Raw => data.to_vec(),
        NormalizationState::Peak => {
            let peak = data.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
            if peak == 0.0 {
                data.to_vec()
            } else {
                data.iter().map(|v| v / peak).collect()
            }
        }
        NormalizationState::Rms => {
            let rms = (data.iter().map(|v| v * v).sum::<f64>() / data.len() as f64).sqrt();
            if rms == 0.0 {
                data.to_vec()
            } else {
                data.iter().map(|v| v / rms).collect()
            }
        }
        NormalizationState::MinMax => {
            let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let range = max - min;
            if range == 0.0 {
                data.to_vec()
            } else {
                data.iter().map(|v| (v - min) / range).collect()
            }
        }
        NormalizationState::ZScore => {
            let mean = data.iter().sum::<f64>() / data.len() as f64;
            let var = data.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                / data.len() as f64;
            let std = var.sqrt();
            if std == 0.0 {
                data.to_vec()
            } else {
                data.iter().map(|v| (v - mean) / std).collect()
            }
        }
    }
}

/// Content hash of a series, used in the normalization cache key.
pub(crate) fn content_hash(data: &[f64]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for v in data {
        hasher.update(&v.to_le_bytes());
    }
    *hasher.finalize().as_bytes()
}
