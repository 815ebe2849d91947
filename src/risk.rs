//! Risk-based position sizing.
//!
//! Converts balance and risk percentage into a position size that is
//! both ratio-capped and floored at the exchange minimum.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{QuantbotError, Result};

/// Hard sizing limits.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RiskLimits {
    /// Ceiling as a fraction of balance (e.g. 0.5 = half the account).
    pub max_position_ratio: Decimal,
    /// Smallest size worth sending to the exchange.
    pub min_position_size: Decimal,
}

/// Sizing outcome with the intermediate values kept for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionSizeResult {
    pub raw: Decimal,
    pub capped: Decimal,
    pub size: Decimal,
    pub floor_applied: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskManager {
    limits: RiskLimits,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    /// `raw = balance * risk_pct / 100`, capped at
    /// `balance * max_position_ratio`, floored at `min_position_size`.
    pub fn size(&self, balance: Decimal, risk_pct: Decimal) -> Result<PositionSizeResult> {
        if balance <= Decimal::ZERO {
            return Err(QuantbotError::InvalidRiskParameters(format!(
                "balance must be positive, got {balance}"
            )));
        }
        if risk_pct <= Decimal::ZERO {
            return Err(QuantbotError::InvalidRiskParameters(format!(
                "risk_pct must be positive, got {risk_pct}"
            )));
        }

        let raw = balance * risk_pct / Decimal::from(100);
        let cap = balance * self.limits.max_position_ratio;
        let capped = raw.min(cap);
        let floor_applied = capped < self.limits.min_position_size;
        let size = if floor_applied {
            self.limits.min_position_size
        } else {
            capped
        };

        Ok(PositionSizeResult {
            raw,
            capped,
            size,
            floor_applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn manager() -> RiskManager {
        RiskManager::new(RiskLimits {
            max_position_ratio: dec!(0.5),
            min_position_size: dec!(0.001),
        })
    }

    #[test]
    fn nominal_sizing_neither_caps_nor_floors() {
        // balance=1000, risk=2% -> 20
        let result = manager().size(dec!(1000), dec!(2)).unwrap();
        assert_eq!(result.size, dec!(20));
        assert_eq!(result.raw, dec!(20));
        assert!(!result.floor_applied);
    }

    #[test]
    fn oversized_risk_is_capped_at_ratio() {
        // 90% risk on 1000 -> raw 900, capped at 500
        let result = manager().size(dec!(1000), dec!(90)).unwrap();
        assert_eq!(result.raw, dec!(900));
        assert_eq!(result.capped, dec!(500));
        assert_eq!(result.size, dec!(500));
        assert!(!result.floor_applied);
    }

    #[test]
    fn tiny_raw_size_is_floored() {
        // 0.001% of 10 -> 0.0001, below the 0.001 floor
        let result = manager().size(dec!(10), dec!(0.001)).unwrap();
        assert!(result.floor_applied);
        assert_eq!(result.size, dec!(0.001));
    }

    #[test]
    fn size_stays_within_bounds_across_inputs() {
        let m = manager();
        for (balance, risk) in [
            (dec!(1000), dec!(2)),
            (dec!(50), dec!(100)),
            (dec!(100000), dec!(0.5)),
            (dec!(3), dec!(33)),
        ] {
            let result = m.size(balance, risk).unwrap();
            assert!(result.size >= dec!(0.001));
            assert!(result.size <= balance * dec!(0.5) || result.floor_applied);
        }
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let m = manager();
        assert!(m.size(dec!(0), dec!(2)).is_err());
        assert!(m.size(dec!(-10), dec!(2)).is_err());
        assert!(m.size(dec!(1000), dec!(0)).is_err());
        assert!(m.size(dec!(1000), dec!(-5)).is_err());
    }
}
