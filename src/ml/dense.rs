//! Dense neural network with online SGD training (CPU-only).
//!
//! Backs both the ensemble regression heads and the agent's Q head.
//! Explicit shape validation: malformed inputs fail fast so callers can
//! fall back to Hold.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{QuantbotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Linear
    }
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }

    /// Derivative expressed in terms of the activated output.
    fn derivative(self, activated: f64) -> f64 {
        match self {
            Activation::Linear => 1.0,
            Activation::Relu => {
                if activated > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - activated * activated,
            Activation::Sigmoid => activated * (1.0 - activated),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weights shape: [out_dim][in_dim]
    pub weights: Vec<Vec<f64>>,
    /// Bias shape: [out_dim]
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    fn in_dim(&self) -> usize {
        self.weights.first().map(|r| r.len()).unwrap_or(0)
    }

    fn out_dim(&self) -> usize {
        self.weights.len()
    }
}

/// Small fully-connected network trained one sample at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub input_dim: usize,
    pub layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    /// Build a network with Xavier-uniform initial weights.
    ///
    /// `sizes` lists every layer width including input, e.g.
    /// `[20, 64, 64, 1]`. Hidden layers use `hidden`, the last layer
    /// `output`.
    pub fn random(sizes: &[usize], hidden: Activation, output: Activation) -> Self {
        assert!(sizes.len() >= 2, "need at least input and output sizes");
        let mut rng = rand::thread_rng();
        let mut layers = Vec::with_capacity(sizes.len() - 1);
        for (idx, pair) in sizes.windows(2).enumerate() {
            let (in_dim, out_dim) = (pair[0], pair[1]);
            let limit = (6.0 / (in_dim + out_dim) as f64).sqrt();
            let weights = (0..out_dim)
                .map(|_| (0..in_dim).map(|_| rng.gen_range(-limit..limit)).collect())
                .collect();
            let activation = if idx == sizes.len() - 2 { output } else { hidden };
            layers.push(DenseLayer {
                weights,
                bias: vec![0.0; out_dim],
                activation,
            });
        }
        Self {
            input_dim: sizes[0],
            layers,
        }
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.out_dim()).unwrap_or(0)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("layers must not be empty".to_string());
        }
        let mut expected_in = self.input_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.out_dim() == 0 {
                return Err(format!("layer[{idx}] out_dim must be > 0"));
            }
            if layer.bias.len() != layer.out_dim() {
                return Err(format!(
                    "layer[{idx}] bias len {} != out_dim {}",
                    layer.bias.len(),
                    layer.out_dim()
                ));
            }
            for (r, row) in layer.weights.iter().enumerate() {
                if row.len() != expected_in {
                    return Err(format!(
                        "layer[{idx}] weights row {r} len {} != expected in_dim {expected_in}",
                        row.len()
                    ));
                }
            }
            expected_in = layer.out_dim();
        }
        Ok(())
    }

    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        Ok(self.forward_trace(input)?.pop().unwrap_or_default())
    }

    pub fn forward_scalar(&self, input: &[f64]) -> Result<f64> {
        let out = self.forward(input)?;
        if out.len() != 1 {
            return Err(QuantbotError::Model(format!(
                "forward_scalar expects output_dim=1, got {}",
                out.len()
            )));
        }
        Ok(out[0])
    }

    /// One SGD step toward `target` with squared-error loss over every
    /// output.
    pub fn train_step(&mut self, input: &[f64], target: &[f64], lr: f64) -> Result<()> {
        if target.len() != self.output_dim() {
            return Err(QuantbotError::Model(format!(
                "target dim mismatch: got {}, expected {}",
                target.len(),
                self.output_dim()
            )));
        }
        self.backprop(input, |output| {
            output
                .iter()
                .zip(target.iter())
                .map(|(o, t)| o - t)
                .collect()
        }, lr)
    }

    /// One SGD step where only a single output index carries error.
    ///
    /// Used for Q-learning updates: the sampled action's value moves
    /// toward the TD target, other action values are untouched.
    pub fn train_step_masked(
        &mut self,
        input: &[f64],
        output_index: usize,
        target: f64,
        lr: f64,
    ) -> Result<()> {
        if output_index >= self.output_dim() {
            return Err(QuantbotError::Model(format!(
                "output index {} out of range ({} outputs)",
                output_index,
                self.output_dim()
            )));
        }
        self.backprop(input, |output| {
            let mut errors = vec![0.0; output.len()];
            errors[output_index] = output[output_index] - target;
            errors
        }, lr)
    }

    /// Activations for every layer, input included.
    fn forward_trace(&self, input: &[f64]) -> Result<Vec<Vec<f64>>> {
        if input.len() != self.input_dim {
            return Err(QuantbotError::Model(format!(
                "input dim mismatch: got {}, expected {}",
                input.len(),
                self.input_dim
            )));
        }
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input.to_vec());
        for layer in &self.layers {
            let prev = activations.last().expect("trace starts with input");
            let mut out = Vec::with_capacity(layer.out_dim());
            for (row, bias) in layer.weights.iter().zip(layer.bias.iter()) {
                let sum: f64 = bias + row.iter().zip(prev.iter()).map(|(w, x)| w * x).sum::<f64>();
                out.push(layer.activation.apply(sum));
            }
            activations.push(out);
        }
        Ok(activations)
    }

    fn backprop<F>(&mut self, input: &[f64], output_error: F, lr: f64) -> Result<()>
    where
        F: FnOnce(&[f64]) -> Vec<f64>,
    {
        let activations = self.forward_trace(input)?;
        let output = activations.last().expect("trace includes output");

        // Output delta: dL/dz = (a - t) * act'(a)
        let mut delta: Vec<f64> = output_error(output)
            .iter()
            .zip(output.iter())
            .map(|(err, a)| {
                let act = self.layers.last().expect("validated non-empty").activation;
                err * act.derivative(*a)
            })
            .collect();

        for layer_idx in (0..self.layers.len()).rev() {
            let prev_activation = &activations[layer_idx];

            // Propagate before mutating this layer's weights.
            let next_delta: Option<Vec<f64>> = if layer_idx > 0 {
                let layer = &self.layers[layer_idx];
                let act = self.layers[layer_idx - 1].activation;
                let mut below = vec![0.0; layer.in_dim()];
                for (o, row) in layer.weights.iter().enumerate() {
                    for (i, w) in row.iter().enumerate() {
                        below[i] += w * delta[o];
                    }
                }
                for (i, d) in below.iter_mut().enumerate() {
                    *d *= act.derivative(prev_activation[i]);
                }
                Some(below)
            } else {
                None
            };

            let layer = &mut self.layers[layer_idx];
            for (o, row) in layer.weights.iter_mut().enumerate() {
                for (i, w) in row.iter_mut().enumerate() {
                    *w -= lr * delta[o] * prev_activation[i];
                }
                layer.bias[o] -= lr * delta[o];
            }

            if let Some(d) = next_delta {
                delta = d;
            }
        }
        Ok(())
    }
}

fn sigmoid(x: f64) -> f64 {
    // Numerically-stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
