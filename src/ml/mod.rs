//! Lightweight ML core (CPU-only, dependency-light).
//!
//! Small dense networks with online SGD training, plus the fixed
//! sequence-encoder variants used by the predictor ensemble. Intentionally
//! simple so the engine can run 24/7 without GPU/toolchain complexity.

pub mod dense;
pub mod regressor;

pub use dense::{Activation, DenseLayer, DenseNetwork};
pub use regressor::{ModelKind, SequenceRegressor};
