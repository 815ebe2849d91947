//! Feature window construction.
//!
//! Turns flat OHLCV history into fixed-shape `(batch, time_steps,
//! n_features)` tensors for the sequence regressors. Shape problems are
//! explicit errors, never silent padding.

use crate::domain::{MarketObservation, OBSERVATION_FEATURES};
use crate::error::FeatureError;

/// Dense row-major tensor of overlapping feature windows.
///
/// Invariant: `data.len() == batch * time_steps * n_features`. Enforced
/// at construction; accessors can slice without bounds surprises.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    batch: usize,
    time_steps: usize,
    n_features: usize,
    data: Vec<f64>,
}

impl FeatureVector {
    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// One flattened window of `time_steps * n_features` values.
    pub fn window(&self, index: usize) -> &[f64] {
        let stride = self.time_steps * self.n_features;
        &self.data[index * stride..(index + 1) * stride]
    }

    /// The most recent window (used for the latest forecast).
    pub fn latest(&self) -> &[f64] {
        self.window(self.batch - 1)
    }

    pub fn windows(&self) -> impl Iterator<Item = &[f64]> {
        let stride = self.time_steps * self.n_features;
        self.data.chunks_exact(stride)
    }
}

/// Builds sliding feature windows with a fixed per-model shape contract.
#[derive(Debug, Clone, Copy)]
pub struct FeatureWindowBuilder {
    time_steps: usize,
    n_features: usize,
}

impl FeatureWindowBuilder {
    pub fn new(time_steps: usize, n_features: usize) -> Self {
        Self {
            time_steps,
            n_features,
        }
    }

    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    /// All overlapping stride-1 windows over `rows`, each reshaped to
    /// `(time_steps, n_features)`.
    ///
    /// Fails with `InsufficientData` when history is shorter than one
    /// window and with `ShapeMismatch` when the observation feature
    /// count does not match the model contract.
    pub fn build(&self, rows: &[MarketObservation]) -> Result<FeatureVector, FeatureError> {
        if self.n_features != OBSERVATION_FEATURES {
            return Err(FeatureError::ShapeMismatch {
                expected: self.n_features,
                got: OBSERVATION_FEATURES,
            });
        }
        if rows.len() < self.time_steps {
            return Err(FeatureError::InsufficientData {
                have: rows.len(),
                need: self.time_steps,
            });
        }

        let batch = rows.len() - self.time_steps + 1;
        let mut data = Vec::with_capacity(batch * self.time_steps * self.n_features);
        for start in 0..batch {
            for row in &rows[start..start + self.time_steps] {
                data.extend_from_slice(&row.features());
            }
        }

        Ok(FeatureVector {
            batch,
            time_steps: self.time_steps,
            n_features: self.n_features,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn obs(i: usize) -> MarketObservation {
        let base = i as f64;
        MarketObservation {
            timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
            open: base,
            high: base + 1.0,
            low: base - 1.0,
            close: base + 0.5,
            volume: 10.0 * base,
        }
    }

    fn rows(n: usize) -> Vec<MarketObservation> {
        (0..n).map(obs).collect()
    }

    #[test]
    fn build_produces_all_overlapping_windows() {
        let builder = FeatureWindowBuilder::new(3, 5);
        let fv = builder.build(&rows(5)).unwrap();

        // 5 rows, 3 steps -> 3 windows, stride 1
        assert_eq!(fv.batch(), 3);
        assert_eq!(fv.window(0).len(), 3 * 5);

        // Window 1 starts at row 1: open of row 1 is 1.0
        assert_eq!(fv.window(1)[0], 1.0);
        // Latest window starts at row 2
        assert_eq!(fv.latest()[0], 2.0);
    }

    #[test]
    fn build_fails_on_short_history() {
        let builder = FeatureWindowBuilder::new(10, 5);
        let err = builder.build(&rows(4)).unwrap_err();
        assert_eq!(err, FeatureError::InsufficientData { have: 4, need: 10 });
    }

    #[test]
    fn build_fails_on_feature_count_mismatch() {
        let builder = FeatureWindowBuilder::new(3, 8);
        let err = builder.build(&rows(5)).unwrap_err();
        assert_eq!(err, FeatureError::ShapeMismatch { expected: 8, got: 5 });
    }

    #[test]
    fn exact_length_history_yields_single_window() {
        let builder = FeatureWindowBuilder::new(4, 5);
        let fv = builder.build(&rows(4)).unwrap();
        assert_eq!(fv.batch(), 1);
        assert_eq!(fv.latest(), fv.window(0));
    }
}
