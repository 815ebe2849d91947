//! In-process paper-trading ledger.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::domain::{OrderReceipt, OrderRequest, OrderSide};
use crate::error::{QuantbotError, Result};

/// Virtual balance that fills orders synthetically at a reference price.
/// Same decision path as live mode; only the final dispatch differs.
#[derive(Debug)]
pub struct VirtualLedger {
    balance: Decimal,
}

impl VirtualLedger {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            balance: starting_balance,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Fill `request` at `reference_price`: buys debit the balance by
    /// notional, sells credit it. Buys that would overdraw are rejected.
    pub fn fill(&mut self, request: &OrderRequest, reference_price: Decimal) -> Result<OrderReceipt> {
        let price = request.limit_price.unwrap_or(reference_price);
        let notional = request.quantity * price;

        match request.side {
            OrderSide::Buy => {
                if notional > self.balance {
                    return Err(QuantbotError::Validation(format!(
                        "virtual fill would overdraw: notional {} > balance {}",
                        notional, self.balance
                    )));
                }
                self.balance -= notional;
            }
            OrderSide::Sell => {
                self.balance += notional;
            }
        }

        info!(
            symbol = %request.symbol,
            side = %request.side,
            quantity = %request.quantity,
            price = %price,
            balance = %self.balance,
            "virtual fill"
        );

        Ok(OrderReceipt {
            order_id: format!("virtual-{}", Uuid::new_v4()),
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price,
            mode: request.mode,
            executed_at: Utc::now(),
        })
    }
}
