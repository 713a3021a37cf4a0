//! Dual-cursor state machine with snap-to-sample and range zoom.
//!
//! Cursors live at data coordinates and survive pan/zoom. The optional
//! constrain-to-view policy clamps them back into the visible range when
//! the view changes.

use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::events::{AnalysisEvent, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    #[default]
    None,
    Dual,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CursorState {
    pub mode: CursorMode,
    pub c1: Option<f64>,
    pub c2: Option<f64>,
    pub snap_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorId {
    C1,
    C2,
}

/// Zoom margin applied on each side of the cursor range.
const ZOOM_MARGIN: f64 = 0.05;

pub struct CursorController {
    state: CursorState,
    view_range: (f64, f64),
    constrain_to_view: bool,
    /// Time axes of all known signals, refreshed on registry changes.
    snap_axes: Vec<Arc<Vec<f64>>>,
    bus: Arc<EventBus>,
}

impl CursorController {
    pub fn new(bus: Arc<EventBus>, config: &SessionConfig) -> Self {
        Self {
            state: CursorState {
                snap_enabled: config.snap_to_sample,
                ..Default::default()
            },
            view_range: (0.0, 1.0),
            constrain_to_view: config.constrain_cursors_to_view,
            snap_axes: Vec::new(),
            bus,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Restore a persisted cursor state (project load). The mode
    /// invariant is enforced: `None` mode drops any stray positions.
    pub fn restore(&mut self, mut state: CursorState) {
        if state.mode == CursorMode::None {
            state.c1 = None;
            state.c2 = None;
        }
        self.state = state;
        self.publish_positions();
    }

    /// Replace the snap cache with the current set of signal time axes.
    pub fn set_snap_axes(&mut self, axes: Vec<Arc<Vec<f64>>>) {
        self.snap_axes = axes;
    }

    pub fn set_snap_enabled(&mut self, enabled: bool) {
        self.state.snap_enabled = enabled;
    }

    pub fn set_mode(&mut self, mode: CursorMode) {
        match mode {
            CursorMode::None => {
                self.state = CursorState {
                    mode: CursorMode::None,
                    c1: None,
                    c2: None,
                    snap_enabled: self.state.snap_enabled,
                };
                self.bus.publish(AnalysisEvent::CursorsCleared);
            }
            CursorMode::Dual => {
                let (lo, hi) = self.view_range;
                let span = hi - lo;
                self.state.mode = CursorMode::Dual;
                self.state.c1 = Some(lo + span / 3.0);
                self.state.c2 = Some(lo + 2.0 * span / 3.0);
                debug!(
                    "created dual cursors at {:.3} and {:.3}",
                    self.state.c1.unwrap_or_default(),
                    self.state.c2.unwrap_or_default()
                );
                self.publish_positions();
            }
        }
    }

    /// Click placement: create c1, then c2, then move whichever cursor
    /// is closer to the click.
    pub fn click_at(&mut self, x: f64) {
        if self.state.mode == CursorMode::None {
            return;
        }
        let x = self.snap(x);
        match (self.state.c1, self.state.c2) {
            (None, _) => self.state.c1 = Some(x),
            (Some(_), None) => self.state.c2 = Some(x),
            (Some(c1), Some(c2)) => {
                if (x - c1).abs() <= (x - c2).abs() {
                    self.state.c1 = Some(x);
                } else {
                    self.state.c2 = Some(x);
                }
            }
        }
        self.publish_positions();
    }

    pub fn drag(&mut self, cursor: CursorId, x: f64) {
        if self.state.mode == CursorMode::None {
            return;
        }
        let x = self.snap(x);
        match cursor {
            CursorId::C1 => self.state.c1 = Some(x),
            CursorId::C2 => self.state.c2 = Some(x),
        }
        self.publish_positions();
    }

    /// Track the visible x range. With the constrain policy on, cursors
    /// are clamped back inside.
    pub fn set_view_range(&mut self, lo: f64, hi: f64) {
        self.view_range = (lo, hi);
        if !self.constrain_to_view {
            return;
        }
        let mut moved = false;
        for cursor in [&mut self.state.c1, &mut self.state.c2] {
            if let Some(pos) = cursor {
                let clamped = pos.clamp(lo, hi);
                if clamped != *pos {
                    *cursor = Some(clamped);
                    moved = true;
                }
            }
        }
        if moved {
            self.publish_positions();
        }
    }

    /// Range between the cursors expanded by 5% on each side.
    /// Available only when both cursors exist.
    pub fn zoom_to_cursors(&self) -> Option<(f64, f64)> {
        let (c1, c2) = (self.state.c1?, self.state.c2?);
        let (lo, hi) = (c1.min(c2), c1.max(c2));
        let margin = (hi - lo) * ZOOM_MARGIN;
        Some((lo - margin, hi + margin))
    }

    /// Nearest sample x across every known signal; the first signal
    /// encountered wins ties. Identity when snapping is off or no axes
    /// are known.
    fn snap(&self, x: f64) -> f64 {
        if !self.state.snap_enabled {
            return x;
        }
        let mut best = x;
        let mut best_dist = f64::INFINITY;
        for axis in &self.snap_axes {
            if axis.is_empty() {
                continue;
            }
            let idx = axis.partition_point(|&v| v < x);
            for candidate in [idx.checked_sub(1), Some(idx)].into_iter().flatten() {
                if let Some(&v) = axis.get(candidate) {
                    let dist = (v - x).abs();
                    if dist < best_dist {
                        best = v;
                        best_dist = dist;
                    }
                }
            }
        }
        best
    }

    fn publish_positions(&self) {
        self.bus.publish(AnalysisEvent::CursorMoved {
            c1: self.state.c1,
            c2: self.state.c2,
        });
    }
}
