//! Order parameter validation against exchange filters.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::OrderRequest;
use crate::error::{QuantbotError, Result};

/// Per-symbol exchange constraints (tick/step rules).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SymbolFilters {
    pub min_qty: Decimal,
    pub step_size: Decimal,
    pub tick_size: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderValidator {
    filters: SymbolFilters,
}

impl OrderValidator {
    pub fn new(filters: SymbolFilters) -> Self {
        Self { filters }
    }

    /// Reject anything the exchange would bounce. A rejected order is
    /// never dispatched, virtual or live.
    pub fn validate(&self, request: &OrderRequest) -> Result<()> {
        let f = &self.filters;

        if request.quantity < f.min_qty {
            return Err(QuantbotError::Validation(format!(
                "quantity {} below minimum {}",
                request.quantity, f.min_qty
            )));
        }
        if f.step_size > Decimal::ZERO && !(request.quantity % f.step_size).is_zero() {
            return Err(QuantbotError::Validation(format!(
                "quantity {} is not a multiple of step size {}",
                request.quantity, f.step_size
            )));
        }

        if let Some(price) = request.limit_price {
            if price < f.min_price || price > f.max_price {
                return Err(QuantbotError::Validation(format!(
                    "price {} outside [{}, {}]",
                    price, f.min_price, f.max_price
                )));
            }
            if f.tick_size > Decimal::ZERO && !(price % f.tick_size).is_zero() {
                return Err(QuantbotError::Validation(format!(
                    "price {} is not a multiple of tick size {}",
                    price, f.tick_size
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionMode, OrderSide};
    use rust_decimal_macros::dec;

    fn validator() -> OrderValidator {
        OrderValidator::new(SymbolFilters {
            min_qty: dec!(0.001),
            step_size: dec!(0.001),
            tick_size: dec!(0.01),
            min_price: dec!(10),
            max_price: dec!(1000000),
        })
    }

    fn market(qty: Decimal) -> OrderRequest {
        OrderRequest::market("BTCUSDT", OrderSide::Buy, qty, ExecutionMode::Virtual)
    }

    #[test]
    fn accepts_conforming_market_order() {
        assert!(validator().validate(&market(dec!(0.5))).is_ok());
    }

    #[test]
    fn rejects_quantity_below_minimum() {
        let err = validator().validate(&market(dec!(0.0005))).unwrap_err();
        assert!(matches!(err, QuantbotError::Validation(_)));
    }

    #[test]
    fn rejects_quantity_off_step_grid() {
        // 0.0015 is above min_qty but not a multiple of 0.001
        assert!(validator().validate(&market(dec!(0.0015))).is_err());
        assert!(validator().validate(&market(dec!(0.002))).is_ok());
    }

    #[test]
    fn rejects_limit_price_outside_band() {
        let low = OrderRequest::limit("BTCUSDT", OrderSide::Sell, dec!(1), dec!(5), ExecutionMode::Live);
        assert!(validator().validate(&low).is_err());

        let high = OrderRequest::limit(
            "BTCUSDT",
            OrderSide::Sell,
            dec!(1),
            dec!(2000000),
            ExecutionMode::Live,
        );
        assert!(validator().validate(&high).is_err());
    }

    #[test]
    fn rejects_limit_price_off_tick_grid() {
        let off = OrderRequest::limit(
            "BTCUSDT",
            OrderSide::Buy,
            dec!(1),
            dec!(100.005),
            ExecutionMode::Live,
        );
        assert!(validator().validate(&off).is_err());

        let on = OrderRequest::limit(
            "BTCUSDT",
            OrderSide::Buy,
            dec!(1),
            dec!(100.01),
            ExecutionMode::Live,
        );
        assert!(validator().validate(&on).is_ok());
    }

    #[test]
    fn same_rules_apply_regardless_of_mode() {
        for mode in [ExecutionMode::Virtual, ExecutionMode::Live] {
            let req = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(0.0005), mode);
            assert!(validator().validate(&req).is_err(), "{mode}");
        }
    }
}
