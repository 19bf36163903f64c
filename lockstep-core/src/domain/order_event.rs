//! Fill and status-change records emitted by the fill pipeline.

use super::ids::OrderId;
use super::order::OrderStatus;
use super::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable record of a single fill or status transition.
///
/// Produced by a fill model (backtest) or a brokerage adapter (live),
/// applied exactly once to the portfolio, then forwarded to the strategy's
/// order-event callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub status: OrderStatus,
    /// Execution price. Zero for pure status transitions.
    pub fill_price: f64,
    /// Signed quantity executed in this event. Zero for status transitions.
    pub fill_quantity: i64,
    /// Fee in account currency. Non-negative.
    pub fee: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl OrderEvent {
    /// A fill (partial or complete).
    pub fn fill(
        order_id: OrderId,
        symbol: Symbol,
        status: OrderStatus,
        fill_price: f64,
        fill_quantity: i64,
        fee: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        debug_assert!(fee >= 0.0, "fees are never negative");
        Self {
            order_id,
            symbol,
            status,
            fill_price,
            fill_quantity,
            fee,
            message: String::new(),
            timestamp,
        }
    }

    /// A status transition carrying no execution.
    pub fn status(
        order_id: OrderId,
        symbol: Symbol,
        status: OrderStatus,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            symbol,
            status,
            fill_price: 0.0,
            fill_quantity: 0,
            fee: 0.0,
            message: message.into(),
            timestamp,
        }
    }

    /// A validation rejection. Returned to strategy code instead of an error.
    pub fn invalid(
        order_id: OrderId,
        symbol: Symbol,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::status(order_id, symbol, OrderStatus::Invalid, message, timestamp)
    }

    pub fn is_fill(&self) -> bool {
        self.fill_quantity != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_event_carries_execution() {
        let e = OrderEvent::fill(
            OrderId(1),
            Symbol::equity("SPY"),
            OrderStatus::Filled,
            100.0,
            50,
            1.0,
            Utc::now(),
        );
        assert!(e.is_fill());
        assert_eq!(e.fill_quantity, 50);
    }

    #[test]
    fn status_event_is_not_a_fill() {
        let e = OrderEvent::status(
            OrderId(1),
            Symbol::equity("SPY"),
            OrderStatus::Submitted,
            "accepted",
            Utc::now(),
        );
        assert!(!e.is_fill());
        assert_eq!(e.fee, 0.0);
    }

    #[test]
    fn invalid_event_has_invalid_status() {
        let e = OrderEvent::invalid(OrderId(7), Symbol::equity("SPY"), "zero quantity", Utc::now());
        assert_eq!(e.status, OrderStatus::Invalid);
        assert_eq!(e.message, "zero quantity");
    }
}
