//! Error kinds for the analysis core.
//!
//! Recoverable conditions (unknown names, empty results, conflicts) are
//! ordinary `Err` values that the session logs and forwards on the event
//! bus; nothing here is meant to unwind through the host.

use crate::ids::{JobIdentity, TabId};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("invalid range: {detail}")]
    InvalidRange { detail: String },

    #[error("a concatenated filter is active on tab {}; clear it first", active_tab.0)]
    FilterModeConflict { active_tab: TabId },

    #[error("operation produced no samples")]
    EmptyResult,

    #[error("task cancelled")]
    TaskCancelled,

    #[error("task {identity} failed: {detail}")]
    TaskFailed {
        identity: JobIdentity,
        detail: String,
    },

    #[error("invalid project archive: {0}")]
    ArchiveInvalid(String),

    #[error("i/o failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("table error: {0}")]
    TableError(String),
}

impl From<polars::error::PolarsError> for AnalysisError {
    fn from(e: polars::error::PolarsError) -> Self {
        AnalysisError::TableError(e.to_string())
    }
}

impl From<zip::result::ZipError> for AnalysisError {
    fn from(e: zip::result::ZipError) -> Self {
        AnalysisError::ArchiveInvalid(e.to_string())
    }
}
