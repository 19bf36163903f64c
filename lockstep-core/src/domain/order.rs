//! Order types and the forward-only order status machine.

use super::ids::OrderId;
use super::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order pricing semantics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill at the current price, adjusted by the slippage model.
    Market,
    /// Fill at the limit price or better.
    Limit { limit_price: f64 },
    /// Becomes a market order once the stop price is touched.
    StopMarket { stop_price: f64 },
    /// Becomes a limit order once the stop price is touched.
    StopLimit { stop_price: f64, limit_price: f64 },
    /// Fill at the next session open.
    MarketOnOpen,
    /// Fill at the session close.
    MarketOnClose,
}

impl OrderType {
    /// Limit price carried by the order, if the type has one.
    pub fn limit_price(&self) -> Option<f64> {
        match self {
            OrderType::Limit { limit_price } | OrderType::StopLimit { limit_price, .. } => {
                Some(*limit_price)
            }
            _ => None,
        }
    }

    /// Stop price carried by the order, if the type has one.
    pub fn stop_price(&self) -> Option<f64> {
        match self {
            OrderType::StopMarket { stop_price } | OrderType::StopLimit { stop_price, .. } => {
                Some(*stop_price)
            }
            _ => None,
        }
    }
}

/// How long an order remains working.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimeInForce {
    GoodTilCanceled,
    Day,
    GoodTilDate(DateTime<Utc>),
}

/// Order lifecycle states. Transitions are strictly forward: once an order
/// reaches a terminal state it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created, not yet accepted for processing.
    New,
    /// Accepted and working.
    Submitted,
    /// Some quantity filled, remainder still working.
    PartiallyFilled,
    /// Completely filled. Terminal.
    Filled,
    /// Cancelled before completion. Terminal.
    Canceled,
    /// Rejected at validation. Terminal.
    Invalid,
}

impl OrderStatus {
    /// Whether the order is still working (can fill, update, or cancel).
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            OrderStatus::New | OrderStatus::Submitted | OrderStatus::PartiallyFilled
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// Rank used to enforce forward-only transitions. Terminal states share
    /// the top rank: no terminal state may replace another.
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Submitted => 1,
            OrderStatus::PartiallyFilled => 2,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Invalid => 3,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("order {id}: illegal status transition {from:?} -> {to:?}")]
    StatusRegression {
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },
}

/// Buy/sell direction, derived from the sign of the quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Buy,
    Sell,
}

/// A request to transact, as authored by strategy code. The transaction
/// manager turns this into an [`Order`] with an engine-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    /// Signed quantity: positive buys, negative sells.
    pub quantity: i64,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub tag: String,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, quantity: i64) -> Self {
        Self {
            symbol,
            quantity,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::GoodTilCanceled,
            tag: String::new(),
        }
    }

    pub fn limit(symbol: Symbol, quantity: i64, limit_price: f64) -> Self {
        Self {
            symbol,
            quantity,
            order_type: OrderType::Limit { limit_price },
            time_in_force: TimeInForce::GoodTilCanceled,
            tag: String::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// Fields a strategy may change on a working order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateOrderFields {
    pub quantity: Option<i64>,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub tag: Option<String>,
}

/// A single order tracked by the transaction manager. Retained in the
/// transaction history for the lifetime of the run, even after it closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    /// Signed total quantity: positive buys, negative sells.
    pub quantity: i64,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    /// Signed quantity filled so far; same sign as `quantity`.
    pub filled_quantity: i64,
    pub tag: String,
    /// Identifiers assigned by a live brokerage, in arrival order.
    pub broker_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn from_request(id: OrderId, request: OrderRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: request.symbol,
            quantity: request.quantity,
            order_type: request.order_type,
            time_in_force: request.time_in_force,
            status: OrderStatus::New,
            filled_quantity: 0,
            tag: request.tag,
            broker_ids: Vec::new(),
            created_at,
        }
    }

    pub fn direction(&self) -> OrderDirection {
        if self.quantity >= 0 {
            OrderDirection::Buy
        } else {
            OrderDirection::Sell
        }
    }

    /// Signed quantity still unfilled.
    pub fn remaining_quantity(&self) -> i64 {
        self.quantity - self.filled_quantity
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Advance the status. Backward transitions (including replacing one
    /// terminal state with another) are rejected and leave the order
    /// untouched.
    pub fn set_status(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if next == self.status {
            return Ok(());
        }
        if next.rank() <= self.status.rank() {
            return Err(OrderError::StatusRegression {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market_buy(qty: i64) -> Order {
        Order::from_request(
            OrderId(1),
            OrderRequest::market(Symbol::equity("SPY"), qty),
            Utc::now(),
        )
    }

    #[test]
    fn new_order_is_open_with_nothing_filled() {
        let order = market_buy(100);
        assert_eq!(order.status, OrderStatus::New);
        assert!(order.is_open());
        assert_eq!(order.remaining_quantity(), 100);
        assert_eq!(order.direction(), OrderDirection::Buy);
    }

    #[test]
    fn sell_direction_from_sign() {
        let order = market_buy(-50);
        assert_eq!(order.direction(), OrderDirection::Sell);
    }

    #[test]
    fn status_moves_strictly_forward() {
        let mut order = market_buy(100);
        order.set_status(OrderStatus::Submitted).unwrap();
        order.set_status(OrderStatus::PartiallyFilled).unwrap();
        order.set_status(OrderStatus::Filled).unwrap();

        // Terminal: no regression, no terminal-to-terminal swap.
        assert!(order.set_status(OrderStatus::Submitted).is_err());
        assert!(order.set_status(OrderStatus::Canceled).is_err());
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn same_status_is_a_no_op() {
        let mut order = market_buy(100);
        order.set_status(OrderStatus::Submitted).unwrap();
        assert!(order.set_status(OrderStatus::Submitted).is_ok());
    }

    #[test]
    fn skipping_partial_fill_is_allowed() {
        // A market order that fills in one shot goes Submitted -> Filled.
        let mut order = market_buy(100);
        order.set_status(OrderStatus::Submitted).unwrap();
        assert!(order.set_status(OrderStatus::Filled).is_ok());
    }

    #[test]
    fn cancel_from_new_is_allowed() {
        let mut order = market_buy(100);
        assert!(order.set_status(OrderStatus::Canceled).is_ok());
        assert!(order.status.is_terminal());
    }

    #[test]
    fn order_type_price_accessors() {
        let limit = OrderType::Limit { limit_price: 101.5 };
        assert_eq!(limit.limit_price(), Some(101.5));
        assert_eq!(limit.stop_price(), None);

        let stop_limit = OrderType::StopLimit {
            stop_price: 99.0,
            limit_price: 98.5,
        };
        assert_eq!(stop_limit.limit_price(), Some(98.5));
        assert_eq!(stop_limit.stop_price(), Some(99.0));

        assert_eq!(OrderType::Market.limit_price(), None);
    }

    #[test]
    fn remaining_quantity_tracks_fills() {
        let mut order = market_buy(100);
        order.filled_quantity = 60;
        assert_eq!(order.remaining_quantity(), 40);
    }
}
