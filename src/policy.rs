//! Decision policy.
//!
//! One canonical, deterministic rule: compare the ensemble aggregate to
//! the reference price and trade the sign of the delta once it clears
//! the confidence threshold. Pure function of its inputs, no hidden
//! state.

use crate::domain::{Decision, EnsembleSignal, TradeAction};

#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    min_confidence: f64,
}

impl DecisionPolicy {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn decide(&self, signal: &EnsembleSignal, reference_price: f64) -> Decision {
        classify(signal.aggregate, reference_price, self.min_confidence)
    }
}

/// `delta = aggregate - reference`; below the threshold means Hold,
/// otherwise the sign picks the side and `|delta|` is the confidence.
/// Non-finite inputs (bad feed, poisoned forecast) fail safe to Hold.
pub fn classify(aggregate: f64, reference_price: f64, min_confidence: f64) -> Decision {
    if !aggregate.is_finite() || !reference_price.is_finite() {
        return Decision::hold();
    }
    let delta = aggregate - reference_price;
    if delta.abs() < min_confidence {
        return Decision {
            action: TradeAction::Hold,
            confidence: delta.abs(),
        };
    }
    Decision {
        action: if delta > 0.0 {
            TradeAction::Buy
        } else {
            TradeAction::Sell
        },
        confidence: delta.abs(),
    }
}
