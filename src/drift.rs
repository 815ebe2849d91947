//! Prediction drift monitoring.
//!
//! Each cycle the previous cycle's per-model forecasts are scored
//! against the price that actually materialized. Reports are advisory:
//! they feed logs and (eventually) weight adjustments, never the
//! decision path of the current cycle.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::ModelPrediction;

/// How a model's error is judged excessive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DriftThreshold {
    /// Squared error above a fixed amount.
    Absolute(f64),
    /// Absolute error above a fraction of the realized price, so the
    /// same setting works across symbols with different magnitudes.
    Relative(f64),
}

impl Default for DriftThreshold {
    fn default() -> Self {
        // 5% of realized price
        Self::Relative(0.05)
    }
}

impl DriftThreshold {
    fn exceeded(&self, predicted: f64, realized: f64) -> bool {
        let err = predicted - realized;
        match *self {
            DriftThreshold::Absolute(limit) => err * err > limit,
            DriftThreshold::Relative(fraction) => {
                realized != 0.0 && (err / realized).abs() > fraction
            }
        }
    }
}

/// One model's score for a single cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDrift {
    pub model_id: String,
    pub predicted: f64,
    pub squared_error: f64,
    pub drifting: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub realized: f64,
    pub models: Vec<ModelDrift>,
}

impl DriftReport {
    pub fn any_drifting(&self) -> bool {
        self.models.iter().any(|m| m.drifting)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DriftMonitor {
    threshold: DriftThreshold,
}

impl DriftMonitor {
    pub fn new(threshold: DriftThreshold) -> Self {
        Self { threshold }
    }

    /// Score `predictions` (made one cycle ago) against the price that
    /// realized this cycle. Logs each drifting model.
    pub fn check(&self, predictions: &[ModelPrediction], realized: f64) -> DriftReport {
        let models = predictions
            .iter()
            .map(|p| {
                let err = p.value - realized;
                let drifting = self.threshold.exceeded(p.value, realized);
                if drifting {
                    warn!(
                        model = %p.model_id,
                        predicted = p.value,
                        realized,
                        "model prediction drifting"
                    );
                }
                ModelDrift {
                    model_id: p.model_id.clone(),
                    predicted: p.value,
                    squared_error: err * err,
                    drifting,
                }
            })
            .collect();

        DriftReport { realized, models }
    }
}
