//! Session configuration with TOML loading.
//!
//! Every field has a default so a missing or partial file still yields a
//! usable config. Hosts typically ship no file at all.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Debounce window bounds for filter submissions, in milliseconds.
const DEBOUNCE_MIN_MS: u64 = 300;
const DEBOUNCE_MAX_MS: u64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-identity debounce window for filter jobs. Clamped to 300–500 ms.
    pub debounce_ms: u64,
    /// Worker pool size. `None` means hardware concurrency minus one.
    pub worker_threads: Option<usize>,
    /// Whether cursors snap to the nearest sample by default.
    pub snap_to_sample: bool,
    /// Keep cursors inside the visible range during pan/zoom.
    pub constrain_cursors_to_view: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 350,
            worker_threads: None,
            snap_to_sample: false,
            constrain_cursors_to_view: false,
        }
    }
}

impl SessionConfig {
    /// Load from a TOML file. Returns defaults if the file is missing or corrupt.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Debounce window as a `Duration`, clamped to the documented band.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.clamp(DEBOUNCE_MIN_MS, DEBOUNCE_MAX_MS))
    }

    /// Worker pool size: configured value, or hardware concurrency minus one.
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_band() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.debounce(), Duration::from_millis(350));
        assert!(cfg.effective_worker_threads() >= 1);
    }

    #[test]
    fn debounce_is_clamped() {
        let cfg = SessionConfig {
            debounce_ms: 50,
            ..Default::default()
        };
        assert_eq!(cfg.debounce(), Duration::from_millis(300));

        let cfg = SessionConfig {
            debounce_ms: 5_000,
            ..Default::default()
        };
        assert_eq!(cfg.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: SessionConfig = toml::from_str("debounce_ms = 400").unwrap();
        assert_eq!(cfg.debounce_ms, 400);
        assert!(!cfg.snap_to_sample);
        assert!(cfg.worker_threads.is_none());
    }

    #[test]
    fn missing_file_returns_defaults() {
        let cfg = SessionConfig::load(Path::new("/nonexistent/siglab.toml"));
        assert_eq!(cfg.debounce_ms, 350);
    }
}
