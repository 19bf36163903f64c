//! Per-security position state.

use serde::{Deserialize, Serialize};

/// A security's current position and its accumulated statistics.
///
/// Quantity is a signed integer: positive long, negative short. The average
/// price is meaningless when flat and is pinned to zero there; the accounting
/// engine is the only writer, and it maintains that invariant through every
/// fill, including sign crossings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub quantity: i64,
    pub average_price: f64,
    /// Cumulative realized profit in account currency.
    pub realized_profit: f64,
    /// Cumulative fees paid in account currency. Never decreases.
    pub total_fees: f64,
    /// Cumulative traded volume in account currency (sum of |fill notional|).
    pub total_sale_volume: f64,
}

impl Holding {
    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    pub fn abs_quantity(&self) -> i64 {
        self.quantity.abs()
    }

    /// Signed market value in account currency.
    pub fn market_value(&self, price: f64, contract_multiplier: f64, conversion_rate: f64) -> f64 {
        self.quantity as f64 * price * contract_multiplier * conversion_rate
    }

    /// Absolute exposure in account currency, for margin arithmetic.
    pub fn absolute_value(&self, price: f64, contract_multiplier: f64, conversion_rate: f64) -> f64 {
        self.market_value(price, contract_multiplier, conversion_rate).abs()
    }

    /// Unrealized profit at the given price, in account currency.
    pub fn unrealized_profit(
        &self,
        price: f64,
        contract_multiplier: f64,
        conversion_rate: f64,
    ) -> f64 {
        self.quantity as f64 * (price - self.average_price) * contract_multiplier * conversion_rate
    }
}
