//! `layout.json` payload: tabs, graphs, filters, limits, deviation and
//! cursor configuration.
//!
//! Unknown keys are tolerated for forward compatibility (serde's default
//! behavior); required keys error when missing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::analysis::deviation::DeviationConfig;
use crate::analysis::limits::LimitConfig;
use crate::cursor::CursorState;
use crate::error::AnalysisError;
use crate::filter::FilterSpec;
use crate::ids::{GraphId, TabId};

pub const MIN_GRAPHS_PER_TAB: u8 = 1;
pub const MAX_GRAPHS_PER_TAB: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GraphLayout {
    pub graph: GraphId,
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub filter: Option<FilterSpec>,
    #[serde(default)]
    pub limits: HashMap<String, LimitConfig>,
    #[serde(default)]
    pub deviation: Option<DeviationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabLayout {
    pub tab: TabId,
    pub graph_count: u8,
    #[serde(default)]
    pub graphs: Vec<GraphLayout>,
}

impl TabLayout {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(MIN_GRAPHS_PER_TAB..=MAX_GRAPHS_PER_TAB).contains(&self.graph_count) {
            return Err(AnalysisError::ArchiveInvalid(format!(
                "tab {} has graph_count {} outside [{MIN_GRAPHS_PER_TAB}, {MAX_GRAPHS_PER_TAB}]",
                self.tab.0, self.graph_count
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectLayout {
    pub tabs: Vec<TabLayout>,
    #[serde(default)]
    pub time_column: Option<String>,
    #[serde(default)]
    pub cursor: CursorState,
    /// Free-form global settings owned by the host application.
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl ProjectLayout {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for tab in &self.tabs {
            tab.validate()?;
        }
        Ok(())
    }
}
