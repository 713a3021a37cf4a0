//! Property tests for core invariants.
//!
//! Uses proptest to verify:
//! 1. Segment extraction — sorted, non-overlapping, covers exactly the
//!    masked samples
//! 2. Registry invariants — equal array lengths survive any operation
//!    sequence, and restore_originals is byte-identical to load time
//! 3. Normalization round-trips
//! 4. Limit violations are strict and well-formed

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use siglab_core::analysis::limits::{violations, LimitConfig};
use siglab_core::filter::segments::{index_range, segments_from_mask};
use siglab_core::signal::registry::SignalRegistry;
use siglab_core::signal::NormalizationState;

// ── Strategies ───────────────────────────────────────────────────────

fn arb_mask() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(prop::bool::ANY, 1..200)
}

fn arb_series() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1_000.0..1_000.0f64, 1..200)
}

fn axis(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64).collect()
}

// ── 1. Segment extraction ────────────────────────────────────────────

proptest! {
    /// Segments are sorted by start, non-overlapping, and each has
    /// start <= end.
    #[test]
    fn segments_are_sorted_and_disjoint(mask in arb_mask()) {
        let x = axis(mask.len());
        let segments = segments_from_mask(&x, &mask);
        for segment in &segments {
            prop_assert!(segment.start <= segment.end);
        }
        for pair in segments.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
    }

    /// The union of segment index ranges is exactly the set of masked
    /// samples.
    #[test]
    fn segments_cover_exactly_the_mask(mask in arb_mask()) {
        let x = axis(mask.len());
        let segments = segments_from_mask(&x, &mask);
        let mut covered = vec![false; mask.len()];
        for segment in &segments {
            for i in index_range(&x, segment) {
                covered[i] = true;
            }
        }
        prop_assert_eq!(covered, mask);
    }
}

// ── 2. Registry invariants ───────────────────────────────────────────

fn registry_with(y: &[f64]) -> SignalRegistry {
    let registry = SignalRegistry::new();
    let x = Arc::new(axis(y.len()));
    registry
        .add("s", x, Arc::new(y.to_vec()), HashMap::new())
        .unwrap();
    registry
}

proptest! {
    /// Array lengths stay equal through normalization, substitution, and
    /// restoration; restore_originals recovers the load-time bytes.
    #[test]
    fn restore_is_identity_after_mutations(y in arb_series(), keep in 1usize..50) {
        let registry = registry_with(&y);
        let loaded = registry.get("s").unwrap();

        registry.apply_normalization(None, NormalizationState::Peak);

        // Substitute a compacted series of `keep` samples.
        let keep = keep.min(y.len());
        let mut updates = HashMap::new();
        updates.insert(
            "s".to_string(),
            (axis(keep), y[..keep].to_vec()),
        );
        registry.set_filtered(&updates).unwrap();

        let compacted = registry.get("s").unwrap();
        prop_assert_eq!(compacted.x.len(), compacted.y.len());
        prop_assert_eq!(compacted.y.len(), compacted.original_y.len());

        registry.apply_normalization(None, NormalizationState::ZScore);
        registry.restore_originals();

        let restored = registry.get("s").unwrap();
        prop_assert_eq!(restored.x.as_slice(), loaded.x.as_slice());
        prop_assert_eq!(restored.y.as_slice(), loaded.y.as_slice());
        prop_assert_eq!(restored.original_y.as_slice(), loaded.original_y.as_slice());
    }

    /// Normalize then remove is identity on y.
    #[test]
    fn normalization_roundtrip(y in arb_series()) {
        let registry = registry_with(&y);
        let before = registry.get("s").unwrap();

        for method in [
            NormalizationState::Peak,
            NormalizationState::Rms,
            NormalizationState::MinMax,
            NormalizationState::ZScore,
        ] {
            registry.apply_normalization(None, method);
            registry.remove_normalization(None);
            let after = registry.get("s").unwrap();
            prop_assert_eq!(before.y.as_slice(), after.y.as_slice());
        }
    }
}

// ── 3. Limit violations ──────────────────────────────────────────────

proptest! {
    /// Every reported interval contains only strictly-violating samples,
    /// and every strictly-violating sample is inside some interval.
    #[test]
    fn violations_are_strict_and_complete(
        y in arb_series(),
        min in -500.0..0.0f64,
        max in 0.0..500.0f64,
    ) {
        let x = axis(y.len());
        let config = LimitConfig { warning_min: min, warning_max: max, enabled: true };
        let found = violations(&x, &y, &config);

        let mut flagged = vec![false; y.len()];
        for interval in &found {
            prop_assert!(interval.start_index <= interval.end_index);
            for i in interval.start_index..=interval.end_index {
                flagged[i] = true;
            }
        }
        for (i, &v) in y.iter().enumerate() {
            let violating = v < min || v > max;
            prop_assert_eq!(flagged[i], violating, "sample {} value {}", i, v);
        }
    }
}
