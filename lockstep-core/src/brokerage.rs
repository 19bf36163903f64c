//! The brokerage boundary: order routing and the message-severity protocol.

use crate::domain::{Order, OrderEvent, OrderId, UpdateOrderFields};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerageError {
    #[error("order {0} rejected by brokerage: {1}")]
    Rejected(OrderId, String),
    #[error("brokerage does not support this operation: {0}")]
    Unsupported(String),
    #[error("not connected")]
    NotConnected,
}

/// Severity of an out-of-band brokerage message.
///
/// Only `Error`, and a `Disconnect` that stays unresolved while markets are
/// open, escalate to a fatal run-time error; everything else is logged and
/// the run continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageSeverity {
    Information,
    Warning,
    Error,
    Disconnect,
    Reconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerageMessage {
    pub severity: MessageSeverity,
    pub text: String,
}

impl BrokerageMessage {
    pub fn new(severity: MessageSeverity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }
}

/// Order routing to an execution venue.
///
/// Implementations report fills, cancellations, and rejections
/// asynchronously through the order-event sender handed to them at
/// construction — the engine drains that queue at its synchronous points;
/// adapters never touch portfolio state.
pub trait Brokerage: Send {
    /// Route an order. Returns the broker-assigned identifier.
    fn place_order(&mut self, order: &Order) -> Result<String, BrokerageError>;

    fn update_order(
        &mut self,
        order: &Order,
        fields: &UpdateOrderFields,
    ) -> Result<(), BrokerageError>;

    fn cancel_order(&mut self, order: &Order) -> Result<(), BrokerageError>;

    fn is_connected(&self) -> bool;

    fn name(&self) -> &str;
}

/// Accepts everything and reports nothing: fills come from the engine's own
/// fill pipeline. Used for backtests and paper trading.
pub struct PaperBrokerage {
    next_broker_id: u64,
    /// Kept so the adapter can echo asynchronous confirmations if a test
    /// wants them; the paper broker itself never sends fills.
    _events: Sender<OrderEvent>,
}

impl PaperBrokerage {
    pub fn new(events: Sender<OrderEvent>) -> Self {
        Self {
            next_broker_id: 0,
            _events: events,
        }
    }
}

impl Brokerage for PaperBrokerage {
    fn place_order(&mut self, _order: &Order) -> Result<String, BrokerageError> {
        self.next_broker_id += 1;
        Ok(format!("paper-{}", self.next_broker_id))
    }

    fn update_order(
        &mut self,
        _order: &Order,
        _fields: &UpdateOrderFields,
    ) -> Result<(), BrokerageError> {
        Ok(())
    }

    fn cancel_order(&mut self, _order: &Order) -> Result<(), BrokerageError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "PaperBrokerage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderRequest, Symbol};
    use chrono::Utc;
    use std::sync::mpsc::channel;

    #[test]
    fn paper_brokerage_assigns_broker_ids() {
        let (tx, _rx) = channel();
        let mut broker = PaperBrokerage::new(tx);
        let order = Order::from_request(
            OrderId(1),
            OrderRequest::market(Symbol::equity("SPY"), 100),
            Utc::now(),
        );
        let a = broker.place_order(&order).unwrap();
        let b = broker.place_order(&order).unwrap();
        assert_ne!(a, b);
        assert!(broker.is_connected());
    }
}
