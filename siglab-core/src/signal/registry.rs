//! Signal registry: the shared, lock-guarded store of all signals.
//!
//! Single-writer / many-reader. Writers are limited to add/remove,
//! normalization, and the concatenated-mode substitution; readers take
//! consistent snapshots of `Arc` handles.
//!
//! Two layers of "original" exist on purpose:
//! - `Signal::original_y` is the reset target for normalization and is
//!   re-based when concatenated mode compacts a series, so statistics
//!   stay consistent with what is on screen.
//! - the load-time snapshot is never touched and is what
//!   `restore_originals` recovers, byte-identical.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::AnalysisError;
use crate::signal::normalize::{content_hash, normalize};
use crate::signal::{NormalizationState, Signal, SignalSnapshot};

#[derive(Debug, Clone)]
struct LoadSnapshot {
    x: Arc<Vec<f64>>,
    y: Arc<Vec<f64>>,
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NormCacheKey {
    name: String,
    method: u8,
    content: [u8; 32],
}

#[derive(Default)]
struct Inner {
    signals: HashMap<String, Signal>,
    /// Insertion order; `list()` and the filter engine's "first available
    /// signal" rule follow it.
    order: Vec<String>,
    loaded: HashMap<String, LoadSnapshot>,
    norm_cache: HashMap<NormCacheKey, Arc<Vec<f64>>>,
}

/// Memory accounting for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub signal_bytes: usize,
    pub cache_bytes: usize,
    pub signal_count: usize,
}

#[derive(Default)]
pub struct SignalRegistry {
    inner: RwLock<Inner>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signal. The first `add` for a name captures the
    /// untouched load-time snapshot; re-adding replaces the live arrays
    /// but keeps that snapshot.
    pub fn add(
        &self,
        name: &str,
        x: Arc<Vec<f64>>,
        y: Arc<Vec<f64>>,
        metadata: HashMap<String, String>,
    ) -> Result<(), AnalysisError> {
        let signal = Signal {
            name: name.to_string(),
            x: Arc::clone(&x),
            y: Arc::clone(&y),
            original_y: Arc::clone(&y),
            metadata: metadata.clone(),
            normalization: NormalizationState::Raw,
        };
        signal.validate()?;

        let mut inner = self.write();
        if !inner.loaded.contains_key(name) {
            inner.loaded.insert(
                name.to_string(),
                LoadSnapshot {
                    x: Arc::new(x.as_ref().clone()),
                    y: Arc::new(y.as_ref().clone()),
                    metadata,
                },
            );
        }
        if !inner.signals.contains_key(name) {
            inner.order.push(name.to_string());
        }
        inner.signals.insert(name.to_string(), signal);
        debug!("registered signal '{name}' with {} points", y.len());
        Ok(())
    }

    /// Clone of the signal's handles, or `None` if unknown.
    pub fn get(&self, name: &str) -> Option<Signal> {
        self.read().signals.get(name).cloned()
    }

    pub fn remove(&self, name: &str) {
        let mut inner = self.write();
        inner.signals.remove(name);
        inner.loaded.remove(name);
        inner.order.retain(|n| n != name);
        inner.norm_cache.retain(|k, _| k.name != name);
    }

    /// Signal names in registration order.
    pub fn list(&self) -> Vec<String> {
        self.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.read().signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().signals.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.write();
        inner.signals.clear();
        inner.order.clear();
        inner.loaded.clear();
        inner.norm_cache.clear();
    }

    /// Deep-copied handle set for background workers. `names == None`
    /// snapshots everything, in registration order.
    pub fn snapshot(&self, names: Option<&[String]>) -> Vec<SignalSnapshot> {
        let inner = self.read();
        let ordered: Vec<&String> = match names {
            Some(names) => names.iter().collect(),
            None => inner.order.iter().collect(),
        };
        ordered
            .into_iter()
            .filter_map(|name| inner.signals.get(name).map(SignalSnapshot::of))
            .collect()
    }

    /// Substitute compacted series (concatenated display mode).
    ///
    /// `original_y` is re-based to the new length so statistics and
    /// re-normalization stay consistent. Refuses to substitute an empty
    /// series: that case is a no-op surfacing `EmptyResult`, and nothing
    /// is mutated.
    pub fn set_filtered(
        &self,
        updates: &HashMap<String, (Vec<f64>, Vec<f64>)>,
    ) -> Result<(), AnalysisError> {
        if updates.values().any(|(x, _)| x.is_empty()) {
            return Err(AnalysisError::EmptyResult);
        }

        let mut inner = self.write();
        for (name, (x, y)) in updates {
            let Some(signal) = inner.signals.get_mut(name) else {
                warn!("set_filtered: unknown signal '{name}', skipping");
                continue;
            };
            let x = Arc::new(x.clone());
            let y = Arc::new(y.clone());
            signal.x = x;
            signal.y = Arc::clone(&y);
            signal.original_y = y;
            signal.normalization = NormalizationState::Raw;
            debug!(
                "substituted filtered series for '{name}' ({} points)",
                signal.len()
            );
        }
        Ok(())
    }

    /// Restore every signal to the untouched load-time snapshot.
    pub fn restore_originals(&self) {
        let mut inner = self.write();
        let loaded: Vec<(String, LoadSnapshot)> = inner
            .loaded
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, snap) in loaded {
            if let Some(signal) = inner.signals.get_mut(&name) {
                signal.x = Arc::new(snap.x.as_ref().clone());
                signal.y = Arc::new(snap.y.as_ref().clone());
                signal.original_y = Arc::new(snap.y.as_ref().clone());
                signal.metadata = snap.metadata.clone();
                signal.normalization = NormalizationState::Raw;
            }
        }
        debug!("restored original data for all signals");
    }

    /// Normalize the named signals (all when `None`), replacing `y` and
    /// recording the method. Results are cached by content hash, so
    /// repeated toggling is cheap.
    pub fn apply_normalization(
        &self,
        names: Option<&[String]>,
        method: NormalizationState,
    ) -> HashMap<String, Arc<Vec<f64>>> {
        let mut inner = self.write();
        let targets: Vec<String> = match names {
            Some(names) => names.to_vec(),
            None => inner.order.clone(),
        };
        let mut results = HashMap::new();

        for name in targets {
            let Some(signal) = inner.signals.get(&name) else {
                continue;
            };
            // Always normalize from the reference copy so switching
            // methods does not stack.
            let source = Arc::clone(&signal.original_y);
            let key = NormCacheKey {
                name: name.clone(),
                method: method.tag(),
                content: content_hash(&source),
            };
            let normalized = Arc::clone(
                inner
                    .norm_cache
                    .entry(key)
                    .or_insert_with(|| Arc::new(normalize(&source, method))),
            );
            if let Some(signal) = inner.signals.get_mut(&name) {
                signal.y = Arc::clone(&normalized);
                signal.normalization = method;
            }
            results.insert(name, normalized);
        }
        results
    }

    /// Undo normalization for the named signals (all when `None`),
    /// restoring `y` from the reference copy.
    pub fn remove_normalization(&self, names: Option<&[String]>) {
        let mut inner = self.write();
        let targets: Vec<String> = match names {
            Some(names) => names.to_vec(),
            None => inner.order.clone(),
        };
        for name in targets {
            if let Some(signal) = inner.signals.get_mut(&name) {
                signal.y = Arc::clone(&signal.original_y);
                signal.normalization = NormalizationState::Raw;
            }
        }
    }

    /// Signal value at a time point by linear interpolation.
    /// `None` when the signal is unknown, empty, or `t` is out of bounds.
    pub fn value_at(&self, name: &str, t: f64) -> Option<f64> {
        let inner = self.read();
        let signal = inner.signals.get(name)?;
        let x = &signal.x;
        let y = &signal.y;
        if x.is_empty() || t < x[0] || t > x[x.len() - 1] {
            return None;
        }
        let idx = x.partition_point(|&v| v < t);
        if idx < x.len() && x[idx] == t {
            return Some(y[idx]);
        }
        let (x0, x1) = (x[idx - 1], x[idx]);
        let (y0, y1) = (y[idx - 1], y[idx]);
        Some(y0 + (y1 - y0) * (t - x0) / (x1 - x0))
    }

    /// Time axes of all signals, for the cursor snap cache.
    pub fn x_axes(&self) -> Vec<Arc<Vec<f64>>> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.signals.get(name).map(|s| Arc::clone(&s.x)))
            .collect()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let inner = self.read();
        let f64_size = std::mem::size_of::<f64>();
        let signal_bytes = inner
            .signals
            .values()
            .map(|s| (s.x.len() + s.y.len() + s.original_y.len()) * f64_size)
            .sum();
        let cache_bytes = inner
            .norm_cache
            .values()
            .map(|v| v.len() * f64_size)
            .sum();
        MemoryUsage {
            signal_bytes,
            cache_bytes,
            signal_count: inner.signals.len(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("signal registry lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("signal registry lock poisoned")
    }
}
