//! The owned session: one project load, one analysis state.
//!
//! `AnalysisSession` owns the column store, signal registry, filter
//! state, task orchestrator, cursor controller, and event bus. Its
//! lifetime is the project's lifetime; collaborators hold ids, never
//! references into it.

use log::{info, warn};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use crate::analysis::deviation::{self, DeviationConfig, DeviationResult};
use crate::analysis::limits::{self, LimitConfig, ViolationInterval};
use crate::analysis::stats::{self, DutyCycleMode, SignalStats};
use crate::config::SessionConfig;
use crate::cursor::{CursorController, CursorId, CursorMode, CursorState};
use crate::data::column_store::ColumnStore;
use crate::data::table::{ColumnarTable, DataFrameTable};
use crate::error::AnalysisError;
use crate::events::{AnalysisEvent, EventBus};
use crate::filter::applier::{ApplyResult, DrawList, SegmentApplier};
use crate::filter::engine;
use crate::filter::segments::Segment;
use crate::filter::state::FilterState;
use crate::filter::{FilterCondition, FilterMode, FilterSpec};
use crate::ids::{GraphId, JobIdentity, TabId};
use crate::project::archive;
use crate::project::layout::{GraphLayout, ProjectLayout, TabLayout};
use crate::project::metadata::ProjectMetadata;
use crate::signal::registry::SignalRegistry;
use crate::tasks::{FilterJob, TaskOrchestrator};

struct LoadedTable {
    table: Arc<DataFrameTable>,
    store: ColumnStore,
    time_column: String,
}

pub struct AnalysisSession {
    bus: Arc<EventBus>,
    registry: Arc<SignalRegistry>,
    applier: SegmentApplier,
    orchestrator: TaskOrchestrator,
    cursors: Mutex<CursorController>,
    filters: Mutex<FilterState>,
    loaded: Mutex<Option<LoadedTable>>,
    assignments: Mutex<HashMap<JobIdentity, Vec<String>>>,
    graph_limits: Mutex<HashMap<JobIdentity, HashMap<String, LimitConfig>>>,
    graph_deviation: Mutex<HashMap<JobIdentity, DeviationConfig>>,
    draw_lists: Arc<Mutex<HashMap<JobIdentity, DrawList>>>,
}

impl AnalysisSession {
    pub fn new(config: SessionConfig) -> Self {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(SignalRegistry::new());
        let applier = SegmentApplier::new(Arc::clone(&registry), Arc::clone(&bus));
        let orchestrator = TaskOrchestrator::new(Arc::clone(&bus), &config);
        let cursors = Mutex::new(CursorController::new(Arc::clone(&bus), &config));
        Self {
            bus,
            registry,
            applier,
            orchestrator,
            cursors,
            filters: Mutex::new(FilterState::new()),
            loaded: Mutex::new(None),
            assignments: Mutex::new(HashMap::new()),
            graph_limits: Mutex::new(HashMap::new()),
            graph_deviation: Mutex::new(HashMap::new()),
            draw_lists: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<AnalysisEvent> {
        self.bus.subscribe()
    }

    pub fn registry(&self) -> &Arc<SignalRegistry> {
        &self.registry
    }

    // ── Data lifecycle ───────────────────────────────────────────────

    /// Load a table and register every non-time column as a signal.
    ///
    /// The table is canonicalized first: sorted by the time column with
    /// duplicate timestamps dropped (first row wins), which is what makes
    /// the strict-monotonicity invariant hold downstream.
    pub fn load_dataframe(&self, df: DataFrame, time_column: &str) -> Result<(), AnalysisError> {
        if df.column(time_column).is_err() {
            return Err(AnalysisError::UnknownColumn(time_column.to_string()));
        }

        // Temporal columns are normalized to millisecond precision so the
        // pushdown path and the materialized axes agree on units.
        let temporal_casts: Vec<Expr> = df
            .get_columns()
            .iter()
            .filter(|c| matches!(c.dtype(), DataType::Datetime(_, _) | DataType::Date))
            .map(|c| {
                col(c.name().as_str()).cast(DataType::Datetime(TimeUnit::Milliseconds, None))
            })
            .collect();

        let df = df
            .lazy()
            .with_columns(temporal_casts)
            .sort(
                [time_column],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .unique_stable(Some(vec![time_column.into()]), UniqueKeepStrategy::First)
            .collect()?;

        let table = Arc::new(DataFrameTable::new(df));
        let store = ColumnStore::new(Arc::clone(&table) as Arc<dyn ColumnarTable>);
        let x = store.get(time_column)?;

        let mut signal_count = 0usize;
        for name in table.column_names() {
            if name == time_column {
                continue;
            }
            let y = store.get(&name)?;
            let mut metadata = HashMap::new();
            metadata.insert("source_column".to_string(), name.clone());
            match self.registry.add(&name, Arc::clone(&x), y, metadata) {
                Ok(()) => signal_count += 1,
                Err(e) => warn!("skipping column '{name}': {e}"),
            }
        }

        let row_count = x.len();
        if let (Some(&first), Some(&last)) = (x.first(), x.last()) {
            let mut cursors = self.lock_cursors();
            cursors.set_view_range(first, last);
            cursors.set_snap_axes(self.registry.x_axes());
        }
        *self.lock_loaded() = Some(LoadedTable {
            table,
            store,
            time_column: time_column.to_string(),
        });

        info!("loaded table: {row_count} rows, {signal_count} signals");
        self.bus.publish(AnalysisEvent::DataLoaded {
            row_count,
            signal_count,
        });
        Ok(())
    }

    /// Drop everything belonging to the current project.
    pub fn unload(&self) {
        self.orchestrator.cancel_all();
        if let Some(loaded) = self.lock_loaded().take() {
            loaded.store.clear();
        }
        self.registry.clear();
        self.lock_filters().clear();
        self.draw_lists.lock().expect("draw list lock poisoned").clear();
        self.lock_assignments().clear();
        self.lock_limits().clear();
        self.lock_deviation().clear();
        {
            let mut cursors = self.lock_cursors();
            cursors.set_mode(CursorMode::None);
            cursors.set_snap_axes(Vec::new());
        }
        self.bus.publish(AnalysisEvent::DataCleared);
    }

    // ── Graph assignment ─────────────────────────────────────────────

    pub fn set_graph_signals(&self, tab: TabId, graph: GraphId, signals: Vec<String>) {
        self.lock_assignments()
            .insert(JobIdentity::new(tab, graph), signals);
    }

    pub fn graph_signals(&self, tab: TabId, graph: GraphId) -> Vec<String> {
        self.lock_assignments()
            .get(&JobIdentity::new(tab, graph))
            .cloned()
            .unwrap_or_else(|| self.registry.list())
    }

    // ── Filters ──────────────────────────────────────────────────────

    /// Apply a filter through the background orchestrator.
    ///
    /// Mode conflicts are rejected here, synchronously, before anything
    /// is scheduled; the existing state is untouched. Empty conditions
    /// clear the graph's filter instead.
    pub fn apply_filter(&self, spec: FilterSpec) -> Result<(), AnalysisError> {
        spec.validate()?;
        if spec.conditions.is_empty() {
            return self.clear_filter(spec.tab, Some(spec.graph));
        }
        {
            let mut filters = self.lock_filters();
            filters.can_apply(spec.mode, spec.tab)?;
            filters.save(spec.clone());
        }

        let identity = JobIdentity::new(spec.tab, spec.graph);
        let assigned = self.graph_signals(spec.tab, spec.graph);
        let snapshots = self.registry.snapshot(None);

        let registry = Arc::clone(&self.registry);
        let bus = Arc::clone(&self.bus);
        let draw_lists = Arc::clone(&self.draw_lists);
        let (tab, graph, mode) = (spec.tab, spec.graph, spec.mode);

        self.orchestrator.submit_filter_job(
            FilterJob {
                identity,
                signals: snapshots,
                conditions: spec.conditions,
            },
            move |segments| {
                let applier = SegmentApplier::new(registry, Arc::clone(&bus));
                match applier.apply(tab, graph, mode, &segments, &assigned) {
                    Ok(ApplyResult::Segmented(list)) => {
                        draw_lists
                            .lock()
                            .expect("draw list lock poisoned")
                            .insert(identity, list);
                    }
                    Ok(ApplyResult::Concatenated { rows }) => {
                        info!("concatenated series applied: {rows} rows");
                    }
                    Err(e) => {
                        warn!("segment application for {identity} failed: {e}");
                        bus.publish(AnalysisEvent::FilterFailed {
                            identity,
                            reason: e.to_string(),
                        });
                    }
                }
            },
        );
        Ok(())
    }

    /// Clear one graph's filter, or every filter on the tab.
    /// Clearing a concatenated filter restores the original series.
    pub fn clear_filter(&self, tab: TabId, graph: Option<GraphId>) -> Result<(), AnalysisError> {
        let removed = self.lock_filters().remove(tab, graph);
        for spec in &removed {
            let identity = JobIdentity::new(spec.tab, spec.graph);
            self.orchestrator.cancel(identity);
            self.draw_lists
                .lock()
                .expect("draw list lock poisoned")
                .remove(&identity);
            if spec.mode == FilterMode::Concatenated {
                self.applier.clear_concatenation(spec.tab);
                self.lock_cursors().set_snap_axes(self.registry.x_axes());
            }
        }
        Ok(())
    }

    /// Synchronous segment evaluation, preferring polars predicate
    /// pushdown while the source table is available.
    pub fn evaluate_segments_now(
        &self,
        conditions: &[FilterCondition],
    ) -> Result<Vec<Segment>, AnalysisError> {
        {
            let loaded = self.lock_loaded();
            if let Some(loaded) = loaded.as_ref() {
                return engine::pushdown_segments(
                    loaded.table.dataframe(),
                    &loaded.time_column,
                    conditions,
                );
            }
        }
        let snapshots = self.registry.snapshot(None);
        let cancel = AtomicBool::new(false);
        engine::evaluate_segments(&snapshots, conditions, &cancel, |_| {})
    }

    /// Latest draw list produced for a graph in segmented mode.
    pub fn draw_list(&self, tab: TabId, graph: GraphId) -> Option<DrawList> {
        self.draw_lists
            .lock()
            .expect("draw list lock poisoned")
            .get(&JobIdentity::new(tab, graph))
            .cloned()
    }

    pub fn active_filter(&self, tab: TabId, graph: GraphId) -> Option<FilterSpec> {
        self.lock_filters().get(tab, graph).cloned()
    }

    pub fn concatenated_tab(&self) -> Option<TabId> {
        self.lock_filters().concatenated_tab()
    }

    // ── Statistics ───────────────────────────────────────────────────

    pub fn statistics(
        &self,
        names: Option<&[String]>,
        time_range: Option<(f64, f64)>,
        duty_mode: DutyCycleMode,
        duty_value: f64,
    ) -> HashMap<String, SignalStats> {
        let result = stats::compute(&self.registry, names, time_range, duty_mode, duty_value);
        self.bus.publish(AnalysisEvent::StatsUpdated {
            stats: result.clone(),
        });
        result
    }

    /// Statistics scoped to the dual-cursor range when both cursors
    /// exist, unscoped otherwise.
    pub fn statistics_between_cursors(
        &self,
        names: Option<&[String]>,
        duty_mode: DutyCycleMode,
        duty_value: f64,
    ) -> HashMap<String, SignalStats> {
        let state = self.lock_cursors().state();
        let range = match (state.c1, state.c2) {
            (Some(a), Some(b)) => Some((a.min(b), a.max(b))),
            _ => None,
        };
        self.statistics(names, range, duty_mode, duty_value)
    }

    // ── Limits ───────────────────────────────────────────────────────

    pub fn set_limits(&self, tab: TabId, graph: GraphId, limits: HashMap<String, LimitConfig>) {
        self.lock_limits()
            .insert(JobIdentity::new(tab, graph), limits);
        self.bus.publish(AnalysisEvent::LimitsChanged { graph });
    }

    /// Violation intervals for every limited signal on a graph.
    pub fn violations(&self, tab: TabId, graph: GraphId) -> HashMap<String, Vec<ViolationInterval>> {
        let configs = self
            .lock_limits()
            .get(&JobIdentity::new(tab, graph))
            .cloned()
            .unwrap_or_default();
        let mut out = HashMap::new();
        for (name, config) in configs {
            let Some(signal) = self.registry.get(&name) else {
                continue;
            };
            out.insert(name, limits::violations(&signal.x, &signal.y, &config));
        }
        out
    }

    // ── Deviation ────────────────────────────────────────────────────

    pub fn set_deviation(&self, tab: TabId, graph: GraphId, config: DeviationConfig) {
        self.lock_deviation()
            .insert(JobIdentity::new(tab, graph), config);
        self.bus.publish(AnalysisEvent::DeviationChanged { graph });
    }

    pub fn deviation(
        &self,
        tab: TabId,
        graph: GraphId,
        signal: &str,
    ) -> Result<DeviationResult, AnalysisError> {
        let config = self
            .lock_deviation()
            .get(&JobIdentity::new(tab, graph))
            .cloned()
            .unwrap_or_default();
        let sig = self
            .registry
            .get(signal)
            .ok_or_else(|| AnalysisError::UnknownSignal(signal.to_string()))?;
        Ok(deviation::analyze(&sig.y, &config))
    }

    /// Deviation analysis for every parameter the graph's config selects
    /// (falling back to the graph's signal assignment). Unknown names are
    /// skipped.
    pub fn deviation_all(&self, tab: TabId, graph: GraphId) -> HashMap<String, DeviationResult> {
        let config = self
            .lock_deviation()
            .get(&JobIdentity::new(tab, graph))
            .cloned()
            .unwrap_or_default();
        let targets = if config.selected_parameters.is_empty() {
            self.graph_signals(tab, graph)
        } else {
            config.selected_parameters.clone()
        };
        let mut out = HashMap::new();
        for name in targets {
            let Some(signal) = self.registry.get(&name) else {
                warn!("deviation requested for unknown signal '{name}', skipping");
                continue;
            };
            out.insert(name, deviation::analyze(&signal.y, &config));
        }
        out
    }

    // ── Normalization ────────────────────────────────────────────────

    /// Normalize the named signals (all when `None`) and report the new
    /// statistics, since every consumer of the series just changed.
    pub fn apply_normalization(
        &self,
        names: Option<&[String]>,
        method: crate::signal::NormalizationState,
    ) -> HashMap<String, SignalStats> {
        self.registry.apply_normalization(names, method);
        self.statistics(names, None, DutyCycleMode::Auto, 0.0)
    }

    pub fn remove_normalization(&self, names: Option<&[String]>) -> HashMap<String, SignalStats> {
        self.registry.remove_normalization(names);
        self.statistics(names, None, DutyCycleMode::Auto, 0.0)
    }

    // ── Cursors ──────────────────────────────────────────────────────

    pub fn set_cursor_mode(&self, mode: CursorMode) {
        self.lock_cursors().set_mode(mode);
    }

    pub fn cursor_click(&self, x: f64) {
        self.lock_cursors().click_at(x);
    }

    pub fn cursor_drag(&self, cursor: CursorId, x: f64) {
        self.lock_cursors().drag(cursor, x);
    }

    pub fn set_view_range(&self, lo: f64, hi: f64) {
        self.lock_cursors().set_view_range(lo, hi);
    }

    pub fn set_snap_enabled(&self, enabled: bool) {
        self.lock_cursors().set_snap_enabled(enabled);
    }

    pub fn zoom_to_cursors(&self) -> Option<(f64, f64)> {
        self.lock_cursors().zoom_to_cursors()
    }

    pub fn cursor_state(&self) -> CursorState {
        self.lock_cursors().state()
    }

    /// Interpolated signal value at a cursor position.
    pub fn value_at(&self, signal: &str, t: f64) -> Option<f64> {
        self.registry.value_at(signal, t)
    }

    // ── Project persistence ──────────────────────────────────────────

    pub fn save_project(
        &self,
        path: &Path,
        custom_metadata: Option<serde_json::Value>,
        progress: impl FnMut(&str, u8),
    ) -> Result<PathBuf, AnalysisError> {
        let loaded = self.lock_loaded();
        let Some(loaded) = loaded.as_ref() else {
            return Err(AnalysisError::TableError("no data loaded".into()));
        };
        let layout = self.build_layout(&loaded.time_column);
        archive::save(
            path,
            loaded.table.dataframe(),
            &layout,
            custom_metadata,
            progress,
        )
    }

    /// Load a project archive, replacing the current session state.
    /// Derived artifacts (segments, draw lists, statistics) are not
    /// persisted; they are recomputed on demand after the load.
    pub fn load_project(
        &self,
        path: &Path,
        progress: impl FnMut(&str, u8),
    ) -> Result<ProjectMetadata, AnalysisError> {
        let loaded = archive::load(path, progress)?;
        let time_column = loaded
            .layout
            .time_column
            .clone()
            .or_else(|| {
                loaded
                    .dataframe
                    .get_column_names()
                    .first()
                    .map(|s| s.to_string())
            })
            .ok_or_else(|| AnalysisError::ArchiveInvalid("project has no columns".into()))?;

        self.unload();
        self.load_dataframe(loaded.dataframe, &time_column)?;
        self.restore_layout(&loaded.layout);
        Ok(loaded.metadata)
    }

    fn build_layout(&self, time_column: &str) -> ProjectLayout {
        let assignments = self.lock_assignments();
        let filters = self.lock_filters();
        let limits = self.lock_limits();
        let deviations = self.lock_deviation();

        let mut identities: Vec<JobIdentity> = assignments
            .keys()
            .chain(limits.keys())
            .chain(deviations.keys())
            .copied()
            .collect();
        identities.extend(
            filters
                .all_specs()
                .iter()
                .map(|spec| JobIdentity::new(spec.tab, spec.graph)),
        );
        identities.sort();
        identities.dedup();

        let mut per_tab: HashMap<TabId, Vec<GraphLayout>> = HashMap::new();
        for identity in identities {
            let graph = GraphLayout {
                graph: identity.graph,
                signals: assignments.get(&identity).cloned().unwrap_or_default(),
                filter: filters.get(identity.tab, identity.graph).cloned(),
                limits: limits.get(&identity).cloned().unwrap_or_default(),
                deviation: deviations.get(&identity).cloned(),
            };
            per_tab.entry(identity.tab).or_default().push(graph);
        }

        let mut tabs: Vec<TabLayout> = per_tab
            .into_iter()
            .map(|(tab, mut graphs)| {
                graphs.sort_by_key(|g| g.graph);
                let graph_count = graphs
                    .iter()
                    .map(|g| g.graph.0 + 1)
                    .max()
                    .unwrap_or(1)
                    .clamp(1, 10) as u8;
                TabLayout {
                    tab,
                    graph_count,
                    graphs,
                }
            })
            .collect();
        tabs.sort_by_key(|t| t.tab);
        if tabs.is_empty() {
            tabs.push(TabLayout {
                tab: TabId(0),
                graph_count: 1,
                graphs: Vec::new(),
            });
        }

        ProjectLayout {
            tabs,
            time_column: Some(time_column.to_string()),
            cursor: self.lock_cursors().state(),
            settings: serde_json::Value::Null,
        }
    }

    fn restore_layout(&self, layout: &ProjectLayout) {
        for tab in &layout.tabs {
            for graph in &tab.graphs {
                let identity = JobIdentity::new(tab.tab, graph.graph);
                if !graph.signals.is_empty() {
                    self.lock_assignments()
                        .insert(identity, graph.signals.clone());
                }
                if !graph.limits.is_empty() {
                    self.lock_limits().insert(identity, graph.limits.clone());
                }
                if let Some(deviation) = &graph.deviation {
                    self.lock_deviation().insert(identity, deviation.clone());
                }
                if let Some(filter) = &graph.filter {
                    let mut filters = self.lock_filters();
                    if filters.can_apply(filter.mode, filter.tab).is_ok() {
                        filters.save(filter.clone());
                    } else {
                        warn!(
                            "dropping saved filter for {identity}: mode conflict on restore"
                        );
                    }
                }
            }
        }
        self.lock_cursors().restore(layout.cursor);
    }

    /// Tear down background workers. Also runs on drop.
    pub fn close(&mut self) {
        self.orchestrator.shutdown();
    }

    // ── Lock helpers ─────────────────────────────────────────────────

    fn lock_cursors(&self) -> std::sync::MutexGuard<'_, CursorController> {
        self.cursors.lock().expect("cursor lock poisoned")
    }

    fn lock_filters(&self) -> std::sync::MutexGuard<'_, FilterState> {
        self.filters.lock().expect("filter state lock poisoned")
    }

    fn lock_loaded(&self) -> std::sync::MutexGuard<'_, Option<LoadedTable>> {
        self.loaded.lock().expect("table lock poisoned")
    }

    fn lock_assignments(&self) -> std::sync::MutexGuard<'_, HashMap<JobIdentity, Vec<String>>> {
        self.assignments.lock().expect("assignment lock poisoned")
    }

    fn lock_limits(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<JobIdentity, HashMap<String, LimitConfig>>> {
        self.graph_limits.lock().expect("limit lock poisoned")
    }

    fn lock_deviation(&self) -> std::sync::MutexGuard<'_, HashMap<JobIdentity, DeviationConfig>> {
        self.graph_deviation.lock().expect("deviation lock poisoned")
    }
}
