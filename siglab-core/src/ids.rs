//! Stable identifier types for tabs, graphs, and background jobs.
//!
//! Plots, filters, and statistics panels refer to each other only through
//! these ids and resolve them through the session. No back-pointers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! ui_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
            Deserialize,
        )]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

ui_id!(TabId);
ui_id!(GraphId);

/// Identity of a background job: one slot per `(tab, graph)` pair.
///
/// Debouncing and cancellation are keyed on this, so interactions with
/// different graphs never interfere with each other.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct JobIdentity {
    pub tab: TabId,
    pub graph: GraphId,
}

impl JobIdentity {
    pub fn new(tab: TabId, graph: GraphId) -> Self {
        Self { tab, graph }
    }
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab{}_graph{}", self.tab.0, self.graph.0)
    }
}
