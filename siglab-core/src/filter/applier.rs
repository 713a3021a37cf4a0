//! Segment application: turn a filter result into something drawable.
//!
//! Segmented mode produces per-graph draw lists of array views — no
//! copies, the renderer slices the shared `Arc`s. Concatenated mode
//! rewrites every registry signal to the in-order concatenation of the
//! covered slices and announces it on the bus.

use log::warn;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use crate::error::AnalysisError;
use crate::events::{AnalysisEvent, EventBus};
use crate::filter::segments::{index_range, Segment};
use crate::filter::FilterMode;
use crate::ids::{GraphId, TabId};
use crate::signal::registry::SignalRegistry;

/// One renderable slice of one signal.
#[derive(Debug, Clone)]
pub struct DrawEntry {
    pub signal: String,
    pub x: Arc<Vec<f64>>,
    pub y: Arc<Vec<f64>>,
    pub range: Range<usize>,
    /// Only the first slice of a signal carries the legend entry.
    pub legend_visible: bool,
}

pub type DrawList = Vec<DrawEntry>;

#[derive(Debug)]
pub enum ApplyResult {
    Segmented(DrawList),
    Concatenated { rows: usize },
}

pub struct SegmentApplier {
    registry: Arc<SignalRegistry>,
    bus: Arc<EventBus>,
}

impl SegmentApplier {
    pub fn new(registry: Arc<SignalRegistry>, bus: Arc<EventBus>) -> Self {
        Self { registry, bus }
    }

    pub fn apply(
        &self,
        tab: TabId,
        _graph: GraphId,
        mode: FilterMode,
        segments: &[Segment],
        assigned_signals: &[String],
    ) -> Result<ApplyResult, AnalysisError> {
        match mode {
            FilterMode::Segmented => Ok(ApplyResult::Segmented(
                self.build_draw_list(assigned_signals, segments),
            )),
            FilterMode::Concatenated => {
                let rows = self.concatenate(segments)?;
                self.bus.publish(AnalysisEvent::ConcatenationApplied { tab });
                Ok(ApplyResult::Concatenated { rows })
            }
        }
    }

    /// Per-graph draw list: each assigned signal restricted to the
    /// segment intervals, leaving visible gaps between slices.
    pub fn build_draw_list(&self, signals: &[String], segments: &[Segment]) -> DrawList {
        let mut entries = Vec::new();
        for name in signals {
            let Some(signal) = self.registry.get(name) else {
                warn!("draw list requested for unknown signal '{name}', skipping");
                continue;
            };
            let mut first = true;
            for segment in segments {
                let range = index_range(&signal.x, segment);
                if range.is_empty() {
                    continue;
                }
                entries.push(DrawEntry {
                    signal: name.clone(),
                    x: Arc::clone(&signal.x),
                    y: Arc::clone(&signal.y),
                    range,
                    legend_visible: first,
                });
                first = false;
            }
        }
        entries
    }

    /// Rewrite every registry signal to the concatenation of the slices
    /// covered by `segments`, preserving original time values. Returns
    /// the compacted row count.
    ///
    /// An empty result never reaches the registry: the substitution is
    /// all-or-nothing and surfaces `EmptyResult` instead.
    pub fn concatenate(&self, segments: &[Segment]) -> Result<usize, AnalysisError> {
        let mut updates: HashMap<String, (Vec<f64>, Vec<f64>)> = HashMap::new();
        let mut rows = 0usize;

        for name in self.registry.list() {
            let Some(signal) = self.registry.get(&name) else {
                continue;
            };
            let mut x_out = Vec::new();
            let mut y_out = Vec::new();
            for segment in segments {
                let range = index_range(&signal.x, segment);
                x_out.extend_from_slice(&signal.x[range.clone()]);
                y_out.extend_from_slice(&signal.y[range]);
            }
            rows = rows.max(x_out.len());
            updates.insert(name, (x_out, y_out));
        }

        if updates.is_empty() || rows == 0 {
            return Err(AnalysisError::EmptyResult);
        }
        self.registry.set_filtered(&updates)?;
        Ok(rows)
    }

    /// Undo a concatenated substitution and announce it.
    pub fn clear_concatenation(&self, tab: TabId) {
        self.registry.restore_originals();
        self.bus.publish(AnalysisEvent::ConcatenationCleared { tab });
    }
}
