//! Realized-profit transaction records.

use super::ids::OrderId;
use super::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One realized-profit event: a fill that closed (part of) a position.
///
/// Records are keyed by close time in the portfolio's transaction ledger;
/// colliding timestamps are bumped by 1 ms so no record is ever overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: Symbol,
    pub order_id: OrderId,
    /// Quantity closed, always positive.
    pub closed_quantity: i64,
    /// Fill price of the closing execution.
    pub close_price: f64,
    /// Average entry price the close was matched against.
    pub entry_price: f64,
    /// Realized profit in account currency, net of nothing (fees tracked
    /// separately on the holding).
    pub profit: f64,
    pub time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serialization_roundtrip() {
        let record = TradeRecord {
            symbol: Symbol::equity("SPY"),
            order_id: OrderId(3),
            closed_quantity: 10,
            close_price: 110.0,
            entry_price: 100.0,
            profit: 100.0,
            time: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: TradeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
