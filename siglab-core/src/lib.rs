//! Siglab Core — analysis engine for multi-channel time-series data.
//!
//! This crate contains the heart of the analysis tool:
//! - Column store with lazy materialization and NaN/Inf cleanup
//! - Signal registry with normalization and load-time snapshots
//! - Range-filter engine (per-graph segmented and global concatenated
//!   modes) with polars predicate pushdown
//! - Task orchestrator: debounced, cancellable background filter jobs
//! - Warning limits, deviation analysis, and the statistics engine
//! - Dual-cursor controller with snap-to-sample and range zoom
//! - `.mpai` project archive (parquet + JSON in a ZIP container)
//! - Typed event bus connecting all of it to the rendering collaborator

pub mod analysis;
pub mod config;
pub mod cursor;
pub mod data;
pub mod error;
pub mod events;
pub mod filter;
pub mod ids;
pub mod project;
pub mod session;
pub mod signal;
pub mod tasks;

pub use config::SessionConfig;
pub use error::AnalysisError;
pub use session::AnalysisSession;
