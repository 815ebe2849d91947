//! External collaborator traits.
//!
//! Market data and live order execution live outside this crate; both
//! are expressed as async traits so the engine can be wired with real
//! clients in production and doubles in tests.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{MarketObservation, OrderReceipt, OrderRequest};
use crate::error::{ExchangeError, Result};

/// Supplies OHLCV windows and the account balance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Most recent `len` observations for `symbol`, oldest first.
    async fn fetch_window(&self, symbol: &str, len: usize) -> Result<Vec<MarketObservation>>;

    async fn fetch_balance(&self) -> Result<Decimal>;
}

/// Places orders on the live exchange.
///
/// Implementations report failures through `ExchangeError`; the router
/// retries only when `transient` is set.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeExecutor: Send + Sync {
    async fn place_order(
        &self,
        request: &OrderRequest,
    ) -> std::result::Result<OrderReceipt, ExchangeError>;
}
