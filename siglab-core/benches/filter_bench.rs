//! Criterion benchmarks for the filter hot paths.
//!
//! Benchmarks:
//! 1. Mask evaluation over large series (single and multi condition)
//! 2. Segment extraction from dense and sparse masks
//! 3. Polars predicate pushdown vs the mask path
//! 4. Statistics over a large scoped range

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use polars::prelude::*;

use siglab_core::analysis::stats::{signal_stats, DutyCycleMode};
use siglab_core::filter::engine::{evaluate_segments, pushdown_segments};
use siglab_core::filter::segments::segments_from_mask;
use siglab_core::filter::{FilterCondition, RangeBound, RangeFilter, RangeOp};
use siglab_core::signal::SignalSnapshot;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_series(n: usize) -> (Vec<f64>, Vec<f64>) {
    let x: Vec<f64> = (0..n).map(|i| i as f64 * 0.01).collect();
    let y: Vec<f64> = x.iter().map(|v| 100.0 + (v * 3.0).sin() * 50.0).collect();
    (x, y)
}

fn band_conditions() -> Vec<FilterCondition> {
    vec![
        FilterCondition {
            parameter: "signal".into(),
            ranges: vec![RangeFilter {
                bound: RangeBound::Lower,
                op: RangeOp::Ge,
                value: 80.0,
            }],
        },
        FilterCondition {
            parameter: "signal".into(),
            ranges: vec![RangeFilter {
                bound: RangeBound::Upper,
                op: RangeOp::Le,
                value: 130.0,
            }],
        },
    ]
}

fn bench_mask_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_evaluation");
    for n in [100_000usize, 1_000_000] {
        let (x, y) = make_series(n);
        let signals = vec![SignalSnapshot {
            name: "signal".into(),
            x: Arc::new(x),
            y: Arc::new(y),
        }];
        let conditions = band_conditions();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let cancel = AtomicBool::new(false);
                evaluate_segments(black_box(&signals), black_box(&conditions), &cancel, |_| {})
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_segment_extraction(c: &mut Criterion) {
    let n = 1_000_000usize;
    let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let dense: Vec<bool> = (0..n).map(|i| i % 2 == 0).collect();
    let sparse: Vec<bool> = (0..n).map(|i| i % 1000 == 0).collect();

    let mut group = c.benchmark_group("segment_extraction");
    group.bench_function("dense_mask", |b| {
        b.iter(|| segments_from_mask(black_box(&x), black_box(&dense)))
    });
    group.bench_function("sparse_mask", |b| {
        b.iter(|| segments_from_mask(black_box(&x), black_box(&sparse)))
    });
    group.finish();
}

fn bench_pushdown_vs_mask(c: &mut Criterion) {
    let n = 1_000_000usize;
    let (x, y) = make_series(n);
    let df = df!("t" => &x, "signal" => &y).unwrap();
    let conditions = band_conditions();

    let mut group = c.benchmark_group("pushdown_vs_mask");
    group.bench_function("pushdown", |b| {
        b.iter(|| pushdown_segments(black_box(&df), "t", black_box(&conditions)).unwrap())
    });
    let signals = vec![SignalSnapshot {
        name: "signal".into(),
        x: Arc::new(x),
        y: Arc::new(y),
    }];
    group.bench_function("mask", |b| {
        b.iter(|| {
            let cancel = AtomicBool::new(false);
            evaluate_segments(black_box(&signals), black_box(&conditions), &cancel, |_| {})
                .unwrap()
        })
    });
    group.finish();
}

fn bench_statistics(c: &mut Criterion) {
    let (x, y) = make_series(1_000_000);
    c.bench_function("signal_stats_1m", |b| {
        b.iter(|| signal_stats(black_box(&x), black_box(&y), DutyCycleMode::Auto, 0.0).unwrap())
    });
}

criterion_group!(
    benches,
    bench_mask_evaluation,
    bench_segment_extraction,
    bench_pushdown_vs_mask,
    bench_statistics
);
criterion_main!(benches);
