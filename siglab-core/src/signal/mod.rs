//! Signals: named time-indexed numeric series sharing a common time axis.

pub mod normalize;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AnalysisError;

/// How a signal's `y` currently relates to its `original_y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationState {
    Raw,
    Peak,
    Rms,
    MinMax,
    ZScore,
}

impl NormalizationState {
    pub(crate) fn tag(self) -> u8 {
        match self {
            NormalizationState::Raw => 0,
            NormalizationState::Peak => 1,
            NormalizationState::Rms => 2,
            NormalizationState::MinMax => 3,
            NormalizationState::ZScore => 4,
        }
    }
}

/// The unit of analysis: a named series on the shared time grid.
///
/// Arrays are held through `Arc` so workers can snapshot a signal without
/// copying and without being affected by later registry writes.
#[derive(Debug, Clone)]
pub struct Signal {
    pub name: String,
    pub x: Arc<Vec<f64>>,
    pub y: Arc<Vec<f64>>,
    /// Reference copy for reset; re-based when concatenated mode
    /// substitutes a compacted series.
    pub original_y: Arc<Vec<f64>>,
    pub metadata: HashMap<String, String>,
    pub normalization: NormalizationState,
}

impl Signal {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Structural invariants: equal lengths, strictly increasing finite x.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.x.len() != self.y.len() || self.x.len() != self.original_y.len() {
            return Err(AnalysisError::TableError(format!(
                "signal '{}' has mismatched array lengths ({}/{}/{})",
                self.name,
                self.x.len(),
                self.y.len(),
                self.original_y.len()
            )));
        }
        for pair in self.x.windows(2) {
            if !(pair[0] < pair[1]) {
                return Err(AnalysisError::TableError(format!(
                    "signal '{}' time axis is not strictly increasing",
                    self.name
                )));
            }
        }
        if self.x.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::TableError(format!(
                "signal '{}' time axis contains non-finite values",
                self.name
            )));
        }
        Ok(())
    }
}

/// Immutable view of one signal handed to background workers.
///
/// Holds `Arc` references, so a concurrent registry write replaces the
/// signal's arrays without touching what a running worker sees.
#[derive(Debug, Clone)]
pub struct SignalSnapshot {
    pub name: String,
    pub x: Arc<Vec<f64>>,
    pub y: Arc<Vec<f64>>,
}

impl SignalSnapshot {
    pub fn of(signal: &Signal) -> Self {
        Self {
            name: signal.name.clone(),
            x: Arc::clone(&signal.x),
            y: Arc::clone(&signal.y),
        }
    }
}
