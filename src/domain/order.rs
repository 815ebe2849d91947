use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TradeAction;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Directional actions map to a side; Hold has none.
    pub fn from_action(action: TradeAction) -> Option<Self> {
        match action {
            TradeAction::Buy => Some(Self::Buy),
            TradeAction::Sell => Some(Self::Sell),
            TradeAction::Hold => None,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Where an order is routed: a synthetic in-process ledger or the live
/// exchange collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Virtual,
    Live,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Virtual
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Virtual => write!(f, "virtual"),
            ExecutionMode::Live => write!(f, "live"),
        }
    }
}

/// Order request (what we want to do)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// None for market orders.
    pub limit_price: Option<Decimal>,
    pub mode: ExecutionMode,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal, mode: ExecutionMode) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            limit_price: None,
            mode,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            limit_price: Some(price),
            mode,
        }
    }

    pub fn is_limit(&self) -> bool {
        self.limit_price.is_some()
    }
}

/// Receipt for an executed order (synthetic or from the exchange).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// Fill or reference price used for the balance delta.
    pub price: Decimal,
    pub mode: ExecutionMode,
    pub executed_at: DateTime<Utc>,
}
