//! Active-filter bookkeeping and the concatenated-mode exclusion rule.
//!
//! Storage is per tab, per graph. Segmented filters are independent of
//! each other; a concatenated filter is global: while one is active no
//! other filter may be applied anywhere, and it can only be activated
//! when nothing else is.

use log::info;
use std::collections::HashMap;

use crate::error::AnalysisError;
use crate::filter::{FilterMode, FilterSpec};
use crate::ids::{GraphId, TabId};

#[derive(Default)]
pub struct FilterState {
    filters: HashMap<TabId, HashMap<GraphId, FilterSpec>>,
    concatenated_tab: Option<TabId>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the exclusion rule for a prospective filter.
    pub fn can_apply(&self, mode: FilterMode, tab: TabId) -> Result<(), AnalysisError> {
        match mode {
            FilterMode::Concatenated => {
                if let Some(active) = self.concatenated_tab {
                    if active != tab {
                        return Err(AnalysisError::FilterModeConflict { active_tab: active });
                    }
                    // Same tab: updating the active concatenated filter.
                    return Ok(());
                }
                // Activation requires a clean slate: any other live filter
                // blocks, and the error names the first tab holding one.
                if let Some(blocking) = self.first_active_tab() {
                    return Err(AnalysisError::FilterModeConflict {
                        active_tab: blocking,
                    });
                }
                Ok(())
            }
            FilterMode::Segmented => {
                if let Some(active) = self.concatenated_tab {
                    return Err(AnalysisError::FilterModeConflict { active_tab: active });
                }
                Ok(())
            }
        }
    }

    /// Record a filter as active. Call `can_apply` first.
    pub fn save(&mut self, spec: FilterSpec) {
        if spec.mode == FilterMode::Concatenated {
            self.concatenated_tab = Some(spec.tab);
            info!("concatenated mode activated for tab {}", spec.tab.0);
        }
        self.filters
            .entry(spec.tab)
            .or_default()
            .insert(spec.graph, spec);
    }

    pub fn get(&self, tab: TabId, graph: GraphId) -> Option<&FilterSpec> {
        self.filters.get(&tab).and_then(|graphs| graphs.get(&graph))
    }

    /// All filters on a tab, by graph.
    pub fn tab_filters(&self, tab: TabId) -> Vec<&FilterSpec> {
        self.filters
            .get(&tab)
            .map(|graphs| graphs.values().collect())
            .unwrap_or_default()
    }

    /// Every active filter across all tabs.
    pub fn all_specs(&self) -> Vec<&FilterSpec> {
        self.filters
            .values()
            .flat_map(|graphs| graphs.values())
            .collect()
    }

    /// Remove one graph's filter, or every filter on the tab when
    /// `graph` is `None`. Returns the removed specs.
    pub fn remove(&mut self, tab: TabId, graph: Option<GraphId>) -> Vec<FilterSpec> {
        let mut removed = Vec::new();
        if let Some(graphs) = self.filters.get_mut(&tab) {
            match graph {
                Some(graph) => {
                    if let Some(spec) = graphs.remove(&graph) {
                        removed.push(spec);
                    }
                }
                None => removed.extend(graphs.drain().map(|(_, spec)| spec)),
            }
            if graphs.is_empty() {
                self.filters.remove(&tab);
            }
        }
        if removed
            .iter()
            .any(|spec| spec.mode == FilterMode::Concatenated)
        {
            self.concatenated_tab = None;
            info!("concatenated mode deactivated");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.filters.clear();
        self.concatenated_tab = None;
    }

    pub fn has_active_filters(&self) -> bool {
        self.filters.values().any(|graphs| !graphs.is_empty())
    }

    pub fn concatenated_tab(&self) -> Option<TabId> {
        self.concatenated_tab
    }

    pub fn total_count(&self) -> usize {
        self.filters.values().map(|graphs| graphs.len()).sum()
    }

    fn first_active_tab(&self) -> Option<TabId> {
        self.filters
            .iter()
            .filter(|(_, graphs)| !graphs.is_empty())
            .map(|(tab, _)| *tab)
            .min()
    }
}
