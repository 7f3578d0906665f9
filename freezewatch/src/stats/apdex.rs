//! Apdex (Application Performance Index) accumulator.
//!
//! Each latency sample falls into one bucket relative to a tolerable
//! threshold `T`:
//!
//! ```text
//! observed ≤ T        → satisfied
//! observed ≤ 4·T      → tolerating
//! otherwise           → frustrated
//!
//! score = (satisfied + tolerating / 2) / samples
//! ```
//!
//! [`ApdexData`] is a `Copy` value; `with_event` returns a new one. Scores over
//! a window are computed from the difference between the current value and a
//! baseline captured earlier.

// Scores are ratios of small counters
#![allow(clippy::cast_precision_loss)]

use serde::Serialize;
use std::sync::RwLock;

/// Default multiple of the tolerable latency that still counts as tolerating.
pub const DEFAULT_FRUSTRATION_FACTOR: u64 = 4;

/// Immutable Apdex counters.
///
/// Invariant: `satisfied + tolerating + frustrated == samples`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ApdexData {
    satisfied: u64,
    tolerating: u64,
    frustrated: u64,
    samples: u64,
}

impl ApdexData {
    pub const EMPTY: ApdexData = ApdexData { satisfied: 0, tolerating: 0, frustrated: 0, samples: 0 };

    /// Classify one latency sample with the default 4× frustration factor.
    #[must_use]
    pub fn with_event(self, tolerable_ms: u64, observed_ms: u64) -> Self {
        self.with_event_factor(tolerable_ms, observed_ms, DEFAULT_FRUSTRATION_FACTOR)
    }

    /// Classify one latency sample with an explicit frustration factor.
    #[must_use]
    pub fn with_event_factor(self, tolerable_ms: u64, observed_ms: u64, factor: u64) -> Self {
        let mut next = self;
        if observed_ms <= tolerable_ms {
            next.satisfied += 1;
        } else if observed_ms <= tolerable_ms.saturating_mul(factor) {
            next.tolerating += 1;
        } else {
            next.frustrated += 1;
        }
        next.samples += 1;
        next
    }

    #[must_use]
    pub fn satisfied(&self) -> u64 {
        self.satisfied
    }

    #[must_use]
    pub fn tolerating(&self) -> u64 {
        self.tolerating
    }

    #[must_use]
    pub fn frustrated(&self) -> u64 {
        self.frustrated
    }

    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Counters accumulated since `baseline` (a value this one evolved from).
    #[must_use]
    pub fn since(&self, baseline: &ApdexData) -> ApdexData {
        ApdexData {
            satisfied: self.satisfied.saturating_sub(baseline.satisfied),
            tolerating: self.tolerating.saturating_sub(baseline.tolerating),
            frustrated: self.frustrated.saturating_sub(baseline.frustrated),
            samples: self.samples.saturating_sub(baseline.samples),
        }
    }

    /// Apdex score in `[0, 1]`, `None` without samples.
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        (self.samples > 0)
            .then(|| (self.satisfied as f64 + self.tolerating as f64 / 2.0) / self.samples as f64)
    }

    /// Human-readable score over the window since `baseline`.
    ///
    /// ```text
    /// 0.93 (120 samples)
    /// n/a (0 samples)
    /// ```
    #[must_use]
    pub fn summarize_since(&self, baseline: &ApdexData) -> String {
        let delta = self.since(baseline);
        match delta.score() {
            Some(score) => format!("{score:.2} ({} samples)", delta.samples),
            None => "n/a (0 samples)".to_string(),
        }
    }
}

/// Shared slot holding the current [`ApdexData`].
///
/// Writers replace the whole value; readers copy it out. A reader therefore
/// sees either the previous or the next value, never a mix of the two.
#[derive(Debug, Default)]
pub struct ApdexCell {
    current: RwLock<ApdexData>,
}

impl ApdexCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current value.
    #[must_use]
    pub fn load(&self) -> ApdexData {
        self.current.read().map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
    }

    /// Replace the value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(ApdexData) -> ApdexData) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = f(*guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_boundaries() {
        let data = ApdexData::EMPTY
            .with_event(100, 100) // satisfied (boundary)
            .with_event(100, 101) // tolerating
            .with_event(100, 400) // tolerating (boundary)
            .with_event(100, 401); // frustrated
        assert_eq!(data.satisfied(), 1);
        assert_eq!(data.tolerating(), 2);
        assert_eq!(data.frustrated(), 1);
        assert_eq!(data.samples(), 4);
    }

    #[test]
    fn test_counts_partition_samples() {
        let mut data = ApdexData::EMPTY;
        for observed in (0..2_000).step_by(37) {
            let before = data.samples();
            data = data.with_event(100, observed);
            assert_eq!(data.samples(), before + 1);
            assert_eq!(data.satisfied() + data.tolerating() + data.frustrated(), data.samples());
        }
    }

    #[test]
    fn test_with_event_leaves_original_untouched() {
        let original = ApdexData::EMPTY.with_event(100, 10);
        let _next = original.with_event(100, 1_000);
        assert_eq!(original.samples(), 1);
        assert_eq!(original.frustrated(), 0);
    }

    #[test]
    fn test_summarize_since_baseline() {
        let baseline = ApdexData::EMPTY.with_event(100, 5_000).with_event(100, 5_000);
        let now = baseline.with_event(100, 10).with_event(100, 200);
        // window: 1 satisfied + 1 tolerating → (1 + 0.5) / 2
        assert_eq!(now.summarize_since(&baseline), "0.75 (2 samples)");
        assert_eq!(now.summarize_since(&now), "n/a (0 samples)");
    }

    #[test]
    fn test_custom_factor() {
        let data = ApdexData::EMPTY.with_event_factor(100, 250, 2);
        assert_eq!(data.frustrated(), 1);
    }

    #[test]
    fn test_cell_replaces_whole_value() {
        let cell = ApdexCell::new();
        let before = cell.load();
        cell.update(|d| d.with_event(100, 10));
        assert_eq!(before.samples(), 0);
        assert_eq!(cell.load().samples(), 1);
    }
}
