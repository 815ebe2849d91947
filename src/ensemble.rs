//! Predictor ensemble.
//!
//! A set of independently trained sequence regressors whose scalar
//! forecasts are combined into one signal. Weights, when supplied, are
//! renormalized so they always sum to 1.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{EnsembleSignal, ModelPrediction};
use crate::error::{QuantbotError, Result};
use crate::features::FeatureVector;
use crate::ml::{ModelKind, SequenceRegressor};

pub struct PredictorEnsemble {
    members: Vec<SequenceRegressor>,
    /// Normalized model_id -> weight; None means plain arithmetic mean.
    weights: Option<BTreeMap<String, f64>>,
}

impl PredictorEnsemble {
    /// Build the standard forecaster set (short-memory, gated-memory,
    /// attention) for the given window shape.
    pub fn new(time_steps: usize, n_features: usize) -> Self {
        let members = ModelKind::forecasters()
            .iter()
            .map(|kind| SequenceRegressor::new(*kind, time_steps, n_features))
            .collect();
        Self {
            members,
            weights: None,
        }
    }

    pub fn model_ids(&self) -> Vec<&'static str> {
        self.members.iter().map(|m| m.model_id()).collect()
    }

    /// Install per-model weights. Renormalized if they do not sum to 1;
    /// a non-positive sum falls back to the unweighted mean.
    pub fn set_weights(&mut self, weights: BTreeMap<String, f64>) {
        let sum: f64 = weights.values().sum();
        if sum <= 0.0 || !sum.is_finite() {
            debug!("ensemble weights sum {sum} unusable, using arithmetic mean");
            self.weights = None;
            return;
        }
        let normalized = weights.into_iter().map(|(k, v)| (k, v / sum)).collect();
        self.weights = Some(normalized);
    }

    pub fn weights(&self) -> Option<&BTreeMap<String, f64>> {
        self.weights.as_ref()
    }

    /// Forecast from every member over the latest window, aggregated
    /// into a single signal.
    pub fn predict(&self, x: &FeatureVector) -> Result<EnsembleSignal> {
        let mut predictions = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let value = member.predict_latest(x)?;
            if !value.is_finite() {
                return Err(QuantbotError::Model(format!(
                    "{} produced non-finite forecast",
                    member.model_id()
                )));
            }
            predictions.push(ModelPrediction::new(member.model_id(), value));
        }

        let aggregate = self.aggregate(&predictions);
        let confidence = agreement(&predictions, aggregate);

        Ok(EnsembleSignal {
            predictions,
            aggregate,
            confidence,
        })
    }

    /// Retrain one member in place. Replace-in-place: the live model
    /// mutates, so callers serialize this against `predict`.
    pub fn train(&mut self, model_id: &str, x: &FeatureVector, targets: &[f64]) -> Result<()> {
        let member = self
            .members
            .iter_mut()
            .find(|m| m.model_id() == model_id)
            .ok_or_else(|| QuantbotError::Model(format!("unknown model id: {model_id}")))?;
        member.train(x, targets)
    }

    fn aggregate(&self, predictions: &[ModelPrediction]) -> f64 {
        match &self.weights {
            Some(weights) => {
                let mut total = 0.0;
                let mut weight_sum = 0.0;
                for p in predictions {
                    let w = weights.get(&p.model_id).copied().unwrap_or(0.0);
                    total += w * p.value;
                    weight_sum += w;
                }
                if weight_sum > 0.0 {
                    total / weight_sum
                } else {
                    mean(predictions)
                }
            }
            None => mean(predictions),
        }
    }
}

fn mean(predictions: &[ModelPrediction]) -> f64 {
    predictions.iter().map(|p| p.value).sum::<f64>() / predictions.len() as f64
}

/// Agreement score in [0, 1]: 1 when members coincide, decaying with the
/// relative dispersion around the aggregate.
fn agreement(predictions: &[ModelPrediction], aggregate: f64) -> f64 {
    if predictions.len() < 2 {
        return 1.0;
    }
    let var = predictions
        .iter()
        .map(|p| (p.value - aggregate).powi(2))
        .sum::<f64>()
        / predictions.len() as f64;
    let scale = aggregate.abs().max(1.0);
    1.0 / (1.0 + var.sqrt() / scale)
}
