use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of numeric columns carried per observation (OHLCV).
pub const OBSERVATION_FEATURES: usize = 5;

/// One OHLCV bar for a single time interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketObservation {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl MarketObservation {
    /// Numeric columns in fixed order; the timestamp is dropped before
    /// any reshaping.
    pub fn features(&self) -> [f64; OBSERVATION_FEATURES] {
        [self.open, self.high, self.low, self.close, self.volume]
    }
}

/// Trade action produced by the decision layer.
///
/// Indices are stable (Sell=0, Hold=1, Buy=2) because the agent's
/// Q head maps outputs by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TradeAction {
    Sell = 0,
    Hold = 1,
    Buy = 2,
}

impl TradeAction {
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Sell),
            1 => Some(Self::Hold),
            2 => Some(Self::Buy),
            _ => None,
        }
    }

    pub fn to_index(self) -> usize {
        self as usize
    }

    pub fn all() -> &'static [TradeAction] {
        &[Self::Sell, Self::Hold, Self::Buy]
    }
}

impl Default for TradeAction {
    fn default() -> Self {
        Self::Hold
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Sell => write!(f, "sell"),
            TradeAction::Hold => write!(f, "hold"),
            TradeAction::Buy => write!(f, "buy"),
        }
    }
}

/// Scalar price forecast from a single ensemble member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub model_id: String,
    pub value: f64,
}

impl ModelPrediction {
    pub fn new(model_id: impl Into<String>, value: f64) -> Self {
        Self {
            model_id: model_id.into(),
            value,
        }
    }
}

/// Combined forecast from the predictor ensemble.
///
/// `aggregate` is the (optionally weighted) mean of member predictions;
/// `confidence` is an agreement score in [0, 1] derived from member
/// dispersion. The decision layer reports its own confidence as the
/// price delta, independently of this score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSignal {
    pub predictions: Vec<ModelPrediction>,
    pub aggregate: f64,
    pub confidence: f64,
}

/// Action plus the confidence behind it, as produced by the decision policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: TradeAction,
    pub confidence: f64,
}

impl Decision {
    pub fn hold() -> Self {
        Self {
            action: TradeAction::Hold,
            confidence: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_index_roundtrip() {
        for action in TradeAction::all() {
            assert_eq!(TradeAction::from_index(action.to_index()), Some(*action));
        }
        assert_eq!(TradeAction::from_index(3), None);
    }

    #[test]
    fn observation_features_drop_timestamp() {
        let obs = MarketObservation {
            timestamp: Utc::now(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 100.0,
        };
        assert_eq!(obs.features(), [1.0, 2.0, 0.5, 1.5, 100.0]);
    }
}
