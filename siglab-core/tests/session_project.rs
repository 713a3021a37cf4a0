//! Session-level persistence: save a working session, load it back, and
//! confirm the analysis state that should survive actually does.

use std::collections::HashMap;

use polars::prelude::*;
use tempfile::TempDir;

use siglab_core::analysis::deviation::DeviationConfig;
use siglab_core::analysis::limits::LimitConfig;
use siglab_core::cursor::{CursorId, CursorMode};
use siglab_core::filter::{
    FilterCondition, FilterMode, FilterSpec, RangeBound, RangeFilter, RangeOp,
};
use siglab_core::ids::{GraphId, TabId};
use siglab_core::{AnalysisSession, SessionConfig};

fn test_config() -> SessionConfig {
    SessionConfig {
        worker_threads: Some(2),
        ..Default::default()
    }
}

fn loaded_session() -> AnalysisSession {
    let session = AnalysisSession::new(test_config());
    let t: Vec<f64> = (0..50).map(|i| i as f64).collect();
    let speed: Vec<f64> = t.iter().map(|v| 100.0 + v).collect();
    let temp: Vec<f64> = t.iter().map(|v| 20.0 + v * 0.5).collect();
    let df = df!("t" => &t, "speed" => &speed, "temp" => &temp).unwrap();
    session.load_dataframe(df, "t").unwrap();
    session
}

fn band_filter(tab: u32, graph: u32) -> FilterSpec {
    FilterSpec {
        conditions: vec![FilterCondition {
            parameter: "speed".into(),
            ranges: vec![RangeFilter {
                bound: RangeBound::Lower,
                op: RangeOp::Ge,
                value: 120.0,
            }],
        }],
        mode: FilterMode::Segmented,
        tab: TabId(tab),
        graph: GraphId(graph),
    }
}

#[test]
fn project_roundtrip_restores_analysis_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.mpai");

    let session = loaded_session();
    session.set_graph_signals(TabId(0), GraphId(0), vec!["speed".into()]);
    session.set_graph_signals(TabId(0), GraphId(1), vec!["temp".into()]);
    let mut limits = HashMap::new();
    limits.insert(
        "speed".to_string(),
        LimitConfig {
            warning_min: 90.0,
            warning_max: 140.0,
            enabled: true,
        },
    );
    session.set_limits(TabId(0), GraphId(0), limits.clone());
    session.set_deviation(TabId(0), GraphId(1), DeviationConfig::default());
    session.apply_filter(band_filter(0, 0)).unwrap();
    session.set_cursor_mode(CursorMode::Dual);
    session.cursor_drag(CursorId::C1, 5.0);
    session.cursor_drag(CursorId::C2, 25.0);

    let written = session.save_project(&path, None, |_, _| {}).unwrap();

    let restored = AnalysisSession::new(test_config());
    let metadata = restored.load_project(&written, |_, _| {}).unwrap();
    assert_eq!(metadata.data_info.row_count, 50);

    // Signals and assignments came back.
    assert_eq!(restored.registry().list(), vec!["speed", "temp"]);
    assert_eq!(
        restored.graph_signals(TabId(0), GraphId(0)),
        vec!["speed".to_string()]
    );

    // The saved filter is active state again (its segments are not
    // persisted; they recompute on the next apply).
    let filter = restored.active_filter(TabId(0), GraphId(0)).unwrap();
    assert_eq!(filter.conditions[0].parameter, "speed");

    // Limits and cursors survived.
    let violations = restored.violations(TabId(0), GraphId(0));
    assert!(violations.contains_key("speed"));
    let cursor = restored.cursor_state();
    assert_eq!(cursor.mode, CursorMode::Dual);
    assert_eq!(cursor.c1, Some(5.0));
    assert_eq!(cursor.c2, Some(25.0));
}

#[test]
fn save_without_data_fails() {
    let dir = TempDir::new().unwrap();
    let session = AnalysisSession::new(test_config());
    let result = session.save_project(&dir.path().join("empty.mpai"), None, |_, _| {});
    assert!(result.is_err());
}

#[test]
fn load_failure_leaves_previous_state_untouched() {
    let dir = TempDir::new().unwrap();
    let bogus = dir.path().join("bogus.mpai");
    std::fs::write(&bogus, b"not a project").unwrap();

    let session = loaded_session();
    assert!(session.load_project(&bogus, |_, _| {}).is_err());
    // The previously loaded signals are still there.
    assert_eq!(session.registry().list(), vec!["speed", "temp"]);
}

#[test]
fn table_numeric_equality_after_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("numeric.mpai");

    let session = loaded_session();
    let before = session.registry().get("speed").unwrap();
    session.save_project(&path, None, |_, _| {}).unwrap();

    let restored = AnalysisSession::new(test_config());
    restored.load_project(&path, |_, _| {}).unwrap();
    let after = restored.registry().get("speed").unwrap();

    assert_eq!(before.x.as_slice(), after.x.as_slice());
    assert_eq!(before.y.as_slice(), after.y.as_slice());
}
