//! Range filters: per-parameter clauses, per-graph specs, and the
//! evaluation machinery that turns them into time segments.

pub mod applier;
pub mod engine;
pub mod segments;
pub mod state;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AnalysisError;
use crate::ids::{GraphId, TabId};

/// Which side of a parameter's band a range constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeBound {
    Lower,
    Upper,
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeBound::Lower => f.write_str("lower"),
            RangeBound::Upper => f.write_str("upper"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl fmt::Display for RangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RangeOp::Gt => ">",
            RangeOp::Ge => ">=",
            RangeOp::Lt => "<",
            RangeOp::Le => "<=",
        };
        f.write_str(s)
    }
}

/// One bound of a parameter clause, e.g. `>= 20.0` on the lower side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub bound: RangeBound,
    pub op: RangeOp,
    pub value: f64,
}

impl RangeFilter {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let consistent = match self.bound {
            RangeBound::Lower => matches!(self.op, RangeOp::Gt | RangeOp::Ge),
            RangeBound::Upper => matches!(self.op, RangeOp::Lt | RangeOp::Le),
        };
        if consistent {
            Ok(())
        } else {
            Err(AnalysisError::InvalidRange {
                detail: format!(
                    "operator {} is not valid for the {} bound",
                    self.op, self.bound
                ),
            })
        }
    }

    #[inline]
    pub(crate) fn matches(&self, v: f64) -> bool {
        match self.op {
            RangeOp::Gt => v > self.value,
            RangeOp::Ge => v >= self.value,
            RangeOp::Lt => v < self.value,
            RangeOp::Le => v <= self.value,
        }
    }
}

/// Per-parameter clause: the ranges are OR-ed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub parameter: String,
    pub ranges: Vec<RangeFilter>,
}

impl FilterCondition {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.ranges.is_empty() {
            return Err(AnalysisError::InvalidRange {
                detail: format!("condition on '{}' has no ranges", self.parameter),
            });
        }
        for range in &self.ranges {
            range.validate()?;
        }
        Ok(())
    }
}

/// Display mode driven by one filter result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Per-graph: original time axis kept, gaps visible.
    Segmented,
    /// Global across the tab: series rewritten to the concatenation of
    /// matching intervals. At most one of these may exist anywhere.
    Concatenated,
}

/// A complete filter for one graph. Conditions are AND-ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub conditions: Vec<FilterCondition>,
    pub mode: FilterMode,
    pub tab: TabId,
    pub graph: GraphId,
}

impl FilterSpec {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for condition in &self.conditions {
            condition.validate()?;
        }
        Ok(())
    }
}
