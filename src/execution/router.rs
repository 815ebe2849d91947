//! Order routing with retry/backoff on the live path.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::{ExecutionMode, OrderReceipt, OrderRequest};
use crate::error::{ExchangeError, Result};
use crate::exchange::ExchangeExecutor;
use crate::execution::{OrderValidator, VirtualLedger};

/// Live-dispatch knobs. Retries apply only to transient exchange
/// failures; permanent rejections surface on the first attempt.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExecutionPolicy {
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Validates every order, then routes it by execution mode.
pub struct OrderRouter {
    validator: OrderValidator,
    policy: ExecutionPolicy,
    ledger: VirtualLedger,
    executor: Arc<dyn ExchangeExecutor>,
}

impl OrderRouter {
    pub fn new(
        validator: OrderValidator,
        policy: ExecutionPolicy,
        ledger: VirtualLedger,
        executor: Arc<dyn ExchangeExecutor>,
    ) -> Self {
        Self {
            validator,
            policy,
            ledger,
            executor,
        }
    }

    pub fn virtual_balance(&self) -> Decimal {
        self.ledger.balance()
    }

    /// Validate and dispatch. Virtual orders fill against the ledger at
    /// `reference_price`; live orders go to the exchange with a per-call
    /// timeout and exponential backoff between transient failures.
    pub async fn submit(
        &mut self,
        request: &OrderRequest,
        reference_price: Decimal,
    ) -> Result<OrderReceipt> {
        self.validator.validate(request)?;

        match request.mode {
            ExecutionMode::Virtual => self.ledger.fill(request, reference_price),
            ExecutionMode::Live => self.place_live(request).await,
        }
    }

    async fn place_live(&self, request: &OrderRequest) -> Result<OrderReceipt> {
        let timeout = Duration::from_millis(self.policy.request_timeout_ms);
        let mut last_err: Option<ExchangeError> = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let backoff = self.policy.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff, "retrying live order");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let outcome = tokio::time::timeout(timeout, self.executor.place_order(request)).await;
            let err = match outcome {
                Ok(Ok(receipt)) => {
                    info!(
                        order_id = %receipt.order_id,
                        symbol = %receipt.symbol,
                        side = %receipt.side,
                        "live order placed"
                    );
                    return Ok(receipt);
                }
                Ok(Err(err)) => err,
                Err(_) => ExchangeError::timeout(self.policy.request_timeout_ms),
            };

            if !err.transient {
                return Err(err.into());
            }
            warn!(code = %err.code, "transient exchange failure: {}", err.message);
            last_err = Some(err);
        }

        Err(last_err
            .unwrap_or_else(|| ExchangeError::timeout(self.policy.request_timeout_ms))
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderSide, TradeAction};
    use crate::error::QuantbotError;
    use crate::exchange::MockExchangeExecutor;
    use crate::execution::SymbolFilters;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn filters() -> SymbolFilters {
        SymbolFilters {
            min_qty: dec!(0.001),
            step_size: dec!(0.001),
            tick_size: dec!(0.01),
            min_price: dec!(1),
            max_price: dec!(1000000),
        }
    }

    fn policy() -> ExecutionPolicy {
        ExecutionPolicy {
            request_timeout_ms: 1_000,
            max_retries: 2,
            retry_backoff_ms: 1,
        }
    }

    fn router(executor: MockExchangeExecutor) -> OrderRouter {
        OrderRouter::new(
            OrderValidator::new(filters()),
            policy(),
            VirtualLedger::new(dec!(10000)),
            Arc::new(executor),
        )
    }

    fn receipt_for(request: &OrderRequest) -> OrderReceipt {
        OrderReceipt {
            order_id: "ex-1".into(),
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price: dec!(100),
            mode: request.mode,
            executed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn virtual_orders_never_touch_the_executor() {
        let mut executor = MockExchangeExecutor::new();
        executor.expect_place_order().times(0);

        let mut router = router(executor);
        let req = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(1), ExecutionMode::Virtual);
        let receipt = router.submit(&req, dec!(100)).await.unwrap();
        assert_eq!(receipt.mode, ExecutionMode::Virtual);
        assert_eq!(router.virtual_balance(), dec!(9900));
    }

    #[tokio::test]
    async fn invalid_orders_are_rejected_before_dispatch() {
        let mut executor = MockExchangeExecutor::new();
        executor.expect_place_order().times(0);

        let mut router = router(executor);
        let req = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(0.0001), ExecutionMode::Live);
        let err = router.submit(&req, dec!(100)).await.unwrap_err();
        assert!(matches!(err, QuantbotError::Validation(_)));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_succeed() {
        let mut executor = MockExchangeExecutor::new();
        let mut calls = 0u32;
        executor.expect_place_order().times(3).returning(move |req| {
            calls += 1;
            if calls < 3 {
                Err(ExchangeError::transient("rate_limit", "slow down"))
            } else {
                Ok(receipt_for(req))
            }
        });

        let mut router = router(executor);
        let req = OrderRequest::market("BTCUSDT", OrderSide::Sell, dec!(1), ExecutionMode::Live);
        let receipt = router.submit(&req, dec!(100)).await.unwrap();
        assert_eq!(receipt.order_id, "ex-1");
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let mut executor = MockExchangeExecutor::new();
        executor
            .expect_place_order()
            .times(1)
            .returning(|_| Err(ExchangeError::permanent("auth", "bad key")));

        let mut router = router(executor);
        let req = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(1), ExecutionMode::Live);
        let err = router.submit(&req, dec!(100)).await.unwrap_err();
        assert!(matches!(err, QuantbotError::Exchange(e) if e.code == "auth"));
    }

    #[tokio::test]
    async fn retries_exhausted_surfaces_last_transient_error() {
        let mut executor = MockExchangeExecutor::new();
        // max_retries=2 -> 3 attempts total
        executor
            .expect_place_order()
            .times(3)
            .returning(|_| Err(ExchangeError::transient("rate_limit", "slow down")));

        let mut router = router(executor);
        let req = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(1), ExecutionMode::Live);
        let err = router.submit(&req, dec!(100)).await.unwrap_err();
        assert!(matches!(err, QuantbotError::Exchange(e) if e.code == "rate_limit"));
    }

    #[test]
    fn hold_never_produces_an_order_side() {
        assert!(OrderSide::from_action(TradeAction::Hold).is_none());
    }
}
