//! Sequence regressors for price forecasting.
//!
//! Each variant is a fixed encoder over a `(time_steps, n_features)`
//! window feeding a small dense head. Topologies are fixed; only the head
//! trains (online SGD toward supplied targets). Model-type dispatch is a
//! closed enum rather than string keys.

use serde::{Deserialize, Serialize};

use crate::error::{QuantbotError, Result};
use crate::features::FeatureVector;
use crate::ml::dense::{Activation, DenseNetwork};

const HEAD_LR: f64 = 1e-3;
const TRAIN_EPOCHS: usize = 5;

/// Closed set of model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Recency-weighted encoder (short effective memory).
    ShortMemory,
    /// Gated running-state encoder.
    GatedMemory,
    /// Similarity-weighted pooling against the latest step.
    Attention,
    /// Flat window regressor, as used by the agent's value approximator.
    Reinforcement,
}

impl ModelKind {
    pub fn id(&self) -> &'static str {
        match self {
            Self::ShortMemory => "short_memory",
            Self::GatedMemory => "gated_memory",
            Self::Attention => "attention",
            Self::Reinforcement => "reinforcement",
        }
    }

    /// The variants that participate in the forecast ensemble.
    pub fn forecasters() -> &'static [ModelKind] {
        &[Self::ShortMemory, Self::GatedMemory, Self::Attention]
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// A pre-wired sequence regressor: fixed `(time_steps, n_features)` input
/// contract, scalar output per batch row.
#[derive(Debug, Clone)]
pub struct SequenceRegressor {
    kind: ModelKind,
    time_steps: usize,
    n_features: usize,
    head: DenseNetwork,
}

impl SequenceRegressor {
    pub fn new(kind: ModelKind, time_steps: usize, n_features: usize) -> Self {
        let head_input = match kind {
            // Flat regressor sees the whole window, encoders compress to
            // one feature row.
            ModelKind::Reinforcement => time_steps * n_features,
            _ => n_features,
        };
        Self {
            kind,
            time_steps,
            n_features,
            head: DenseNetwork::random(
                &[head_input, 64, 64, 1],
                Activation::Relu,
                Activation::Linear,
            ),
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn model_id(&self) -> &'static str {
        self.kind.id()
    }

    /// One scalar forecast per batch row. Non-finite output is a model
    /// error so callers can fail safe.
    pub fn predict(&self, x: &FeatureVector) -> Result<Vec<f64>> {
        self.check_shape(x)?;
        let mut out = Vec::with_capacity(x.batch());
        for window in x.windows() {
            let value = self.head.forward_scalar(&self.encode(window))?;
            if !value.is_finite() {
                return Err(QuantbotError::Model(format!(
                    "{} produced non-finite forecast",
                    self.kind
                )));
            }
            out.push(value);
        }
        Ok(out)
    }

    /// Forecast for the most recent window only.
    pub fn predict_latest(&self, x: &FeatureVector) -> Result<f64> {
        self.check_shape(x)?;
        self.head.forward_scalar(&self.encode(x.latest()))
    }

    /// Retrain the head in place against supplied window targets.
    ///
    /// Mutates the live model; the caller serializes predict/train on
    /// the same instance.
    pub fn train(&mut self, x: &FeatureVector, targets: &[f64]) -> Result<()> {
        self.check_shape(x)?;
        if targets.len() != x.batch() {
            return Err(QuantbotError::Model(format!(
                "target count {} != batch {}",
                targets.len(),
                x.batch()
            )));
        }
        for _ in 0..TRAIN_EPOCHS {
            for (window, target) in x.windows().zip(targets.iter()) {
                let encoded = self.encode(window);
                self.head.train_step(&encoded, &[*target], HEAD_LR)?;
            }
        }
        Ok(())
    }

    fn check_shape(&self, x: &FeatureVector) -> Result<()> {
        if x.time_steps() != self.time_steps || x.n_features() != self.n_features {
            return Err(QuantbotError::Model(format!(
                "{} expects ({}, {}), got ({}, {})",
                self.kind,
                self.time_steps,
                self.n_features,
                x.time_steps(),
                x.n_features()
            )));
        }
        Ok(())
    }

    /// Encode a flattened `(time_steps, n_features)` window into the
    /// head's input space. Features are z-scored within the window first
    /// so price and volume scales cannot swamp the head.
    fn encode(&self, window: &[f64]) -> Vec<f64> {
        let norm = self.standardize(window);
        match self.kind {
            ModelKind::Reinforcement => norm,
            ModelKind::ShortMemory => self.recency_pool(&norm, 0.8),
            ModelKind::GatedMemory => self.gated_pool(&norm),
            ModelKind::Attention => self.attention_pool(&norm),
        }
    }

    /// Per-feature z-score across the window's time steps.
    fn standardize(&self, window: &[f64]) -> Vec<f64> {
        let steps = self.time_steps as f64;
        let mut out = window.to_vec();
        for f in 0..self.n_features {
            let mut mean = 0.0;
            for t in 0..self.time_steps {
                mean += window[t * self.n_features + f];
            }
            mean /= steps;

            let mut var = 0.0;
            for t in 0..self.time_steps {
                let d = window[t * self.n_features + f] - mean;
                var += d * d;
            }
            let std = (var / steps).sqrt().max(1e-8);

            for t in 0..self.time_steps {
                let idx = t * self.n_features + f;
                out[idx] = (window[idx] - mean) / std;
            }
        }
        out
    }

    /// Exponentially-decayed average over time steps, newest heaviest.
    fn recency_pool(&self, window: &[f64], decay: f64) -> Vec<f64> {
        let mut pooled = vec![0.0; self.n_features];
        let mut weight_sum = 0.0;
        for t in 0..self.time_steps {
            let w = decay.powi((self.time_steps - 1 - t) as i32);
            weight_sum += w;
            for f in 0..self.n_features {
                pooled[f] += w * window[t * self.n_features + f];
            }
        }
        for v in &mut pooled {
            *v /= weight_sum;
        }
        pooled
    }

    /// Running state with a per-step scalar update gate driven by the
    /// step's deviation from the running state.
    fn gated_pool(&self, window: &[f64]) -> Vec<f64> {
        let mut state = window[..self.n_features].to_vec();
        for t in 1..self.time_steps {
            let step = &window[t * self.n_features..(t + 1) * self.n_features];
            let deviation: f64 = step
                .iter()
                .zip(state.iter())
                .map(|(x, h)| (x - h).abs())
                .sum::<f64>()
                / self.n_features as f64;
            let gate = 1.0 / (1.0 + (-deviation).exp());
            for (h, x) in state.iter_mut().zip(step.iter()) {
                *h = (1.0 - gate) * *h + gate * *x;
            }
        }
        state
    }

    /// Scaled-dot-product attention pooling with the latest step as query.
    fn attention_pool(&self, window: &[f64]) -> Vec<f64> {
        let query = &window[(self.time_steps - 1) * self.n_features..];
        let scale = (self.n_features as f64).sqrt();

        let mut scores = Vec::with_capacity(self.time_steps);
        for t in 0..self.time_steps {
            let step = &window[t * self.n_features..(t + 1) * self.n_features];
            let dot: f64 = step.iter().zip(query.iter()).map(|(a, b)| a * b).sum();
            scores.push(dot / scale);
        }

        // Softmax with max subtraction for stability.
        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
        let total: f64 = exps.iter().sum();

        let mut pooled = vec![0.0; self.n_features];
        for t in 0..self.time_steps {
            let alpha = exps[t] / total;
            let step = &window[t * self.n_features..(t + 1) * self.n_features];
            for (p, x) in pooled.iter_mut().zip(step.iter()) {
                *p += alpha * x;
            }
        }
        pooled
    }
}
