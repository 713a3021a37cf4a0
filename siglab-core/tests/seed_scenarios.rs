//! End-to-end scenarios with literal values, exercising the session the
//! way the desktop front end does: load a table, filter, measure.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use polars::prelude::*;

use siglab_core::analysis::limits::{violations, LimitConfig, LimitSide};
use siglab_core::analysis::stats::{signal_stats, DutyCycleMode};
use siglab_core::error::AnalysisError;
use siglab_core::events::AnalysisEvent;
use siglab_core::filter::engine::evaluate_segments;
use siglab_core::filter::segments::Segment;
use siglab_core::filter::{
    FilterCondition, FilterMode, FilterSpec, RangeBound, RangeFilter, RangeOp,
};
use siglab_core::ids::{GraphId, TabId};
use siglab_core::signal::SignalSnapshot;
use siglab_core::{AnalysisSession, SessionConfig};

fn range(bound: RangeBound, op: RangeOp, value: f64) -> RangeFilter {
    RangeFilter { bound, op, value }
}

fn condition(parameter: &str, ranges: Vec<RangeFilter>) -> FilterCondition {
    FilterCondition {
        parameter: parameter.to_string(),
        ranges,
    }
}

fn test_config() -> SessionConfig {
    SessionConfig {
        worker_threads: Some(2),
        debounce_ms: 300,
        ..Default::default()
    }
}

fn assert_approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

/// Scenario 1: band filter on one parameter, expressed as two AND-ed
/// conditions, yields two single-sample segments.
#[test]
fn segment_construction() {
    let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let a = vec![0.0, 5.0, 15.0, 25.0, 10.0, 5.0, 20.0, 30.0, 5.0, 0.0];
    let signals = vec![SignalSnapshot {
        name: "A".into(),
        x: x.into(),
        y: a.into(),
    }];
    let conditions = vec![
        condition("A", vec![range(RangeBound::Lower, RangeOp::Gt, 10.0)]),
        condition("A", vec![range(RangeBound::Upper, RangeOp::Lt, 25.0)]),
    ];

    let cancel = AtomicBool::new(false);
    let segments = evaluate_segments(&signals, &conditions, &cancel, |_| {}).unwrap();
    assert_eq!(
        segments,
        vec![Segment::new(2.0, 2.0), Segment::new(6.0, 6.0)]
    );
}

/// Scenario 2: two-parameter AND, via the session's pushdown path.
#[test]
fn two_parameter_and() {
    let session = AnalysisSession::new(test_config());
    let df = df!(
        "t" => &[0.0f64, 1.0, 2.0, 3.0, 4.0],
        "A" => &[1.0f64, 2.0, 3.0, 4.0, 5.0],
        "B" => &[5.0f64, 5.0, 5.0, 1.0, 1.0],
    )
    .unwrap();
    session.load_dataframe(df, "t").unwrap();

    let conditions = vec![
        condition("A", vec![range(RangeBound::Lower, RangeOp::Ge, 3.0)]),
        condition("B", vec![range(RangeBound::Lower, RangeOp::Ge, 3.0)]),
    ];
    let segments = session.evaluate_segments_now(&conditions).unwrap();
    assert_eq!(segments, vec![Segment::new(2.0, 2.0)]);
}

/// Scenario 3: concatenation rewrites the series, cursors interpolate on
/// it, and statistics see the compacted sample set.
#[test]
fn concatenation_flow() {
    let session = AnalysisSession::new(test_config());
    let t: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let y: Vec<f64> = t.iter().map(|v| v * v).collect();
    let a = t.clone();
    let marker = vec![1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
    let df = df!("t" => &t, "Y" => &y, "A" => &a, "M" => &marker).unwrap();
    session.load_dataframe(df, "t").unwrap();

    let rx = session.subscribe();
    let spec = FilterSpec {
        conditions: vec![
            condition("A", vec![range(RangeBound::Lower, RangeOp::Ge, 2.0)]),
            condition("A", vec![range(RangeBound::Upper, RangeOp::Le, 8.0)]),
            condition("M", vec![range(RangeBound::Lower, RangeOp::Ge, 1.0)]),
        ],
        mode: FilterMode::Concatenated,
        tab: TabId(0),
        graph: GraphId(0),
    };
    session.apply_filter(spec).unwrap();

    wait_for(&rx, Duration::from_secs(5), |e| {
        matches!(e, AnalysisEvent::ConcatenationApplied { tab } if *tab == TabId(0))
    });

    let signal = session.registry().get("Y").unwrap();
    assert_eq!(signal.x.as_slice(), &[2.0, 3.0, 4.0, 7.0, 8.0]);
    assert_eq!(signal.y.as_slice(), &[4.0, 9.0, 16.0, 49.0, 64.0]);

    // Cursor at 3.0 interpolates on the compacted series.
    assert_eq!(session.value_at("Y", 3.0), Some(9.0));

    // Statistics see five samples with mean 28.4.
    let stats = session.statistics(
        Some(&["Y".to_string()]),
        None,
        DutyCycleMode::Auto,
        0.0,
    );
    assert_eq!(stats["Y"].count, 5);
    assert_approx(stats["Y"].mean, 28.4);

    // Clearing restores the original ten samples.
    session.clear_filter(TabId(0), Some(GraphId(0))).unwrap();
    let signal = session.registry().get("Y").unwrap();
    assert_eq!(signal.len(), 10);
    assert_eq!(session.concatenated_tab(), None);
}

/// Scenario 4: a concatenated filter on tab 0 blocks a segmented filter
/// on tab 1, and the error names the blocking tab.
#[test]
fn mode_exclusion() {
    let session = AnalysisSession::new(test_config());
    let df = df!(
        "t" => &[0.0f64, 1.0, 2.0],
        "A" => &[1.0f64, 2.0, 3.0],
    )
    .unwrap();
    session.load_dataframe(df, "t").unwrap();

    let concat = FilterSpec {
        conditions: vec![condition(
            "A",
            vec![range(RangeBound::Lower, RangeOp::Ge, 2.0)],
        )],
        mode: FilterMode::Concatenated,
        tab: TabId(0),
        graph: GraphId(0),
    };
    session.apply_filter(concat).unwrap();

    let segmented = FilterSpec {
        conditions: vec![condition(
            "A",
            vec![range(RangeBound::Lower, RangeOp::Ge, 1.0)],
        )],
        mode: FilterMode::Segmented,
        tab: TabId(1),
        graph: GraphId(0),
    };
    let err = session.apply_filter(segmented).unwrap_err();
    assert!(
        matches!(err, AnalysisError::FilterModeConflict { active_tab } if active_tab == TabId(0))
    );

    // State is unchanged: the concatenated filter is still the active one.
    assert_eq!(session.concatenated_tab(), Some(TabId(0)));
    assert!(session.active_filter(TabId(1), GraphId(0)).is_none());
}

/// Scenario 5: limit violations merge per side with strict comparisons.
#[test]
fn limits_and_violations() {
    let y = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0];
    let x: Vec<f64> = (0..y.len()).map(|i| i as f64).collect();
    let config = LimitConfig {
        warning_min: 0.5,
        warning_max: 3.0,
        enabled: true,
    };

    let intervals = violations(&x, &y, &config);
    let summary: Vec<(LimitSide, usize, usize)> = intervals
        .iter()
        .map(|v| (v.side, v.start_index, v.end_index))
        .collect();
    assert_eq!(
        summary,
        vec![
            (LimitSide::BelowMin, 0, 0),
            (LimitSide::AboveMax, 4, 6),
            (LimitSide::BelowMin, 9, 10),
        ]
    );
}

/// Scenario 6: auto duty cycle on a pulse train.
#[test]
fn duty_cycle_auto() {
    let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
    let x: Vec<f64> = (0..y.len()).map(|i| i as f64 * 0.1).collect();
    let stats = signal_stats(&x, &y, DutyCycleMode::Auto, 0.0).unwrap();
    assert_approx(stats.duty_cycle_percent, 100.0 * 0.6 / 1.1);
}

/// Boundary behavior: an empty conditions list produces no segments.
#[test]
fn empty_conditions_mean_no_segments() {
    let session = AnalysisSession::new(test_config());
    let df = df!("t" => &[0.0f64, 1.0], "A" => &[1.0f64, 2.0]).unwrap();
    session.load_dataframe(df, "t").unwrap();
    assert!(session.evaluate_segments_now(&[]).unwrap().is_empty());
}

/// Boundary behavior: statistics on an empty scope return an empty map.
#[test]
fn empty_scope_returns_empty_map() {
    let session = AnalysisSession::new(test_config());
    let df = df!("t" => &[0.0f64, 1.0], "A" => &[1.0f64, 2.0]).unwrap();
    session.load_dataframe(df, "t").unwrap();
    let stats: HashMap<_, _> =
        session.statistics(None, Some((50.0, 60.0)), DutyCycleMode::Auto, 0.0);
    assert!(stats.is_empty());
}

fn wait_for(
    rx: &std::sync::mpsc::Receiver<AnalysisEvent>,
    timeout: Duration,
    mut predicate: impl FnMut(&AnalysisEvent) -> bool,
) {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            panic!("timed out waiting for event");
        }
        match rx.recv_timeout(remaining) {
            Ok(event) if predicate(&event) => return,
            Ok(_) => {}
            Err(_) => panic!("event channel closed while waiting"),
        }
    }
}
