//! Filter evaluation: boolean masks over the shared time axis, and the
//! polars pushdown path that produces the same segments from a lazy
//! predicate when the source table is still available.
//!
//! Semantics: conditions are AND-ed; ranges within one condition are
//! OR-ed. A condition naming an unknown parameter is skipped with a
//! warning; if every condition is skipped the result is empty.

use log::warn;
use polars::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::AnalysisError;
use crate::filter::segments::{segments_from_mask, Segment};
use crate::filter::FilterCondition;
use crate::signal::SignalSnapshot;

/// How many samples are processed between cancellation checks inside the
/// per-range inner loops.
const CANCEL_CHECK_STRIDE: usize = 64 * 1024;

/// Evaluate conditions to a boolean mask over the common time axis.
///
/// The time axis is the x of the first non-empty snapshot; all signals
/// share the grid by construction.
pub fn evaluate_mask(
    signals: &[SignalSnapshot],
    conditions: &[FilterCondition],
    cancel: &AtomicBool,
    mut progress: impl FnMut(u8),
) -> Result<Vec<bool>, AnalysisError> {
    let time = match signals.iter().find(|s| !s.x.is_empty()) {
        Some(s) => &s.x,
        None => return Ok(Vec::new()),
    };
    let n = time.len();
    let mut all = vec![true; n];
    let total = conditions.len();

    for (idx, condition) in conditions.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Err(AnalysisError::TaskCancelled);
        }
        progress((idx * 100 / total.max(1)) as u8);

        let Some(snapshot) = signals.iter().find(|s| s.name == condition.parameter) else {
            warn!(
                "filter condition references unknown parameter '{}'; skipping",
                condition.parameter
            );
            continue;
        };
        let y = &snapshot.y;
        let mut any = vec![false; n];

        for range in &condition.ranges {
            let mut i = 0usize;
            let limit = n.min(y.len());
            while i < limit {
                if cancel.load(Ordering::Relaxed) {
                    return Err(AnalysisError::TaskCancelled);
                }
                let chunk_end = (i + CANCEL_CHECK_STRIDE).min(limit);
                for j in i..chunk_end {
                    any[j] |= range.matches(y[j]);
                }
                i = chunk_end;
            }
        }

        for (a, b) in all.iter_mut().zip(any.iter()) {
            *a &= *b;
        }
    }

    progress(100);
    Ok(all)
}

/// Evaluate conditions and derive the continuous segments they cover.
///
/// Empty conditions or signals yield no segments; whether that means
/// "show all" is the caller's decision.
pub fn evaluate_segments(
    signals: &[SignalSnapshot],
    conditions: &[FilterCondition],
    cancel: &AtomicBool,
    progress: impl FnMut(u8),
) -> Result<Vec<Segment>, AnalysisError> {
    if conditions.is_empty() || signals.is_empty() {
        return Ok(Vec::new());
    }
    let mask = evaluate_mask(signals, conditions, cancel, progress)?;
    let time = signals
        .iter()
        .find(|s| !s.x.is_empty())
        .map(|s| s.x.as_slice())
        .unwrap_or(&[]);
    Ok(segments_from_mask(time, &mask))
}

/// Predicate pushdown: evaluate the same filter inside polars and derive
/// segments from contiguous row-index runs of the filtered frame.
///
/// Preferred over the mask path when the session still holds the source
/// `DataFrame`.
pub fn pushdown_segments(
    df: &DataFrame,
    time_column: &str,
    conditions: &[FilterCondition],
) -> Result<Vec<Segment>, AnalysisError> {
    if conditions.is_empty() || df.height() == 0 {
        return Ok(Vec::new());
    }
    if df.column(time_column).is_err() {
        return Err(AnalysisError::UnknownColumn(time_column.to_string()));
    }

    let mut combined: Option<Expr> = None;
    for condition in conditions {
        if df.column(&condition.parameter).is_err() {
            warn!(
                "filter condition references unknown column '{}'; skipping",
                condition.parameter
            );
            continue;
        }
        let mut range_expr: Option<Expr> = None;
        for range in &condition.ranges {
            let param = col(condition.parameter.as_str());
            let expr = match range.op {
                crate::filter::RangeOp::Gt => param.gt(lit(range.value)),
                crate::filter::RangeOp::Ge => param.gt_eq(lit(range.value)),
                crate::filter::RangeOp::Lt => param.lt(lit(range.value)),
                crate::filter::RangeOp::Le => param.lt_eq(lit(range.value)),
            };
            range_expr = Some(match range_expr {
                Some(acc) => acc.or(expr),
                None => expr,
            });
        }
        if let Some(expr) = range_expr {
            combined = Some(match combined {
                Some(acc) => acc.and(expr),
                None => expr,
            });
        }
    }

    let Some(predicate) = combined else {
        // Every condition was skipped: same contract as an empty filter.
        return Ok(Vec::new());
    };

    let filtered = df
        .clone()
        .lazy()
        .with_row_index("row_nr", None)
        .filter(predicate)
        .select([col("row_nr"), col(time_column).cast(DataType::Float64)])
        .collect()?;

    let rows = filtered.column("row_nr")?.u32()?;
    let times = filtered.column(time_column)?.f64()?;

    let mut segments = Vec::new();
    let mut start_t: Option<f64> = None;
    let mut prev_row: Option<u32> = None;
    let mut prev_t = 0.0f64;

    for i in 0..filtered.height() {
        let (Some(row), Some(t)) = (rows.get(i), times.get(i)) else {
            continue;
        };
        match prev_row {
            Some(pr) if row > pr + 1 => {
                if let Some(st) = start_t.take() {
                    segments.push(Segment::new(st, prev_t));
                }
                start_t = Some(t);
            }
            None => start_t = Some(t),
            _ => {}
        }
        prev_row = Some(row);
        prev_t = t;
    }
    if let (Some(st), Some(_)) = (start_t, prev_row) {
        segments.push(Segment::new(st, prev_t));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{RangeBound, RangeFilter, RangeOp};
    use std::sync::Arc;

    fn snapshot(name: &str, x: Vec<f64>, y: Vec<f64>) -> SignalSnapshot {
        SignalSnapshot {
            name: name.into(),
            x: Arc::new(x),
            y: Arc::new(y),
        }
    }

    fn condition(parameter: &str, ranges: Vec<(RangeBound, RangeOp, f64)>) -> FilterCondition {
        FilterCondition {
            parameter: parameter.into(),
            ranges: ranges
                .into_iter()
                .map(|(bound, op, value)| RangeFilter { bound, op, value })
                .collect(),
        }
    }

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn band_condition_masks_expected_samples() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let a = vec![0.0, 5.0, 15.0, 25.0, 10.0, 5.0, 20.0, 30.0, 5.0, 0.0];
        let signals = vec![snapshot("A", x, a)];
        let conditions = vec![condition(
            "A",
            vec![
                (RangeBound::Lower, RangeOp::Gt, 10.0),
                (RangeBound::Upper, RangeOp::Lt, 25.0),
            ],
        )];

        // A single condition with lower>10 OR upper<25 covers everything
        // except values that violate both; AND semantics live across
        // conditions, so the band is expressed as two conditions below.
        let two_sided = vec![
            condition("A", vec![(RangeBound::Lower, RangeOp::Gt, 10.0)]),
            condition("A", vec![(RangeBound::Upper, RangeOp::Lt, 25.0)]),
        ];
        let mask =
            evaluate_mask(&signals, &two_sided, &no_cancel(), |_| {}).unwrap();
        assert_eq!(
            mask,
            vec![false, false, true, false, false, false, true, false, false, false]
        );

        // OR within one condition: > 10 or < 25 is everywhere true here.
        let mask = evaluate_mask(&signals, &conditions, &no_cancel(), |_| {}).unwrap();
        assert!(mask.iter().all(|&m| m));
    }

    #[test]
    fn unknown_parameter_is_skipped() {
        let x = vec![0.0, 1.0, 2.0];
        let signals = vec![snapshot("A", x, vec![1.0, 2.0, 3.0])];
        let conditions = vec![
            condition("missing", vec![(RangeBound::Lower, RangeOp::Ge, 100.0)]),
            condition("A", vec![(RangeBound::Lower, RangeOp::Ge, 2.0)]),
        ];
        let segments =
            evaluate_segments(&signals, &conditions, &no_cancel(), |_| {}).unwrap();
        assert_eq!(segments, vec![Segment::new(1.0, 2.0)]);
    }

    #[test]
    fn all_conditions_skipped_is_empty() {
        let signals = vec![snapshot("A", vec![0.0, 1.0], vec![1.0, 2.0])];
        let conditions = vec![condition(
            "missing",
            vec![(RangeBound::Lower, RangeOp::Ge, 0.0)],
        )];
        let segments =
            evaluate_segments(&signals, &conditions, &no_cancel(), |_| {}).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn cancelled_evaluation_returns_task_cancelled() {
        let signals = vec![snapshot("A", vec![0.0, 1.0], vec![1.0, 2.0])];
        let conditions = vec![condition(
            "A",
            vec![(RangeBound::Lower, RangeOp::Ge, 0.0)],
        )];
        let cancel = AtomicBool::new(true);
        let result = evaluate_segments(&signals, &conditions, &cancel, |_| {});
        assert!(matches!(result, Err(AnalysisError::TaskCancelled)));
    }

    #[test]
    fn progress_reaches_completion() {
        let signals = vec![snapshot("A", vec![0.0, 1.0], vec![1.0, 2.0])];
        let conditions = vec![condition(
            "A",
            vec![(RangeBound::Lower, RangeOp::Ge, 0.0)],
        )];
        let mut seen = Vec::new();
        evaluate_segments(&signals, &conditions, &no_cancel(), |p| seen.push(p)).unwrap();
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
    }

    #[test]
    fn pushdown_matches_mask_path() {
        let df = df!(
            "t" => &[0.0f64, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            "A" => &[0.0f64, 5.0, 15.0, 25.0, 10.0, 5.0, 20.0, 30.0, 5.0, 0.0],
        )
        .unwrap();
        let conditions = vec![
            condition("A", vec![(RangeBound::Lower, RangeOp::Gt, 10.0)]),
            condition("A", vec![(RangeBound::Upper, RangeOp::Lt, 25.0)]),
        ];
        let segments = pushdown_segments(&df, "t", &conditions).unwrap();
        assert_eq!(
            segments,
            vec![Segment::new(2.0, 2.0), Segment::new(6.0, 6.0)]
        );
    }

    #[test]
    fn pushdown_empty_conditions_yield_no_segments() {
        let df = df!("t" => &[0.0f64, 1.0], "A" => &[1.0f64, 2.0]).unwrap();
        assert!(pushdown_segments(&df, "t", &[]).unwrap().is_empty());
    }
}
