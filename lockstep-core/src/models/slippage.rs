//! Slippage models. The output is a price deviation, not a price; the fill
//! model applies it in the adverse direction.

use super::SlippageModel;
use crate::domain::{Order, OrderType, Security};

/// No slippage.
pub struct ZeroSlippageModel;

impl SlippageModel for ZeroSlippageModel {
    fn slippage(&self, _security: &Security, _order: &Order) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "ZeroSlippageModel"
    }
}

/// A fixed fraction of the current price, in basis points. Passive limit
/// fills take none.
pub struct SpreadBpsSlippageModel {
    pub bps: f64,
}

impl SpreadBpsSlippageModel {
    pub fn new(bps: f64) -> Self {
        Self { bps }
    }
}

impl SlippageModel for SpreadBpsSlippageModel {
    fn slippage(&self, security: &Security, order: &Order) -> f64 {
        if matches!(
            order.order_type,
            OrderType::Limit { .. } | OrderType::StopLimit { .. }
        ) {
            return 0.0;
        }
        security.price() * (self.bps / 10_000.0)
    }

    fn name(&self) -> &str {
        "SpreadBpsSlippageModel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, OrderId, OrderRequest, SecuritySeed, Symbol};
    use chrono::Utc;

    fn security() -> Security {
        let mut sec = Security::from_seed(SecuritySeed::us_equity("SPY"));
        sec.update_bar(Bar::at(100.0, 1_000.0));
        sec
    }

    fn market_order() -> Order {
        Order::from_request(
            OrderId(1),
            OrderRequest::market(Symbol::equity("SPY"), 100),
            Utc::now(),
        )
    }

    #[test]
    fn zero_model_returns_zero() {
        assert_eq!(ZeroSlippageModel.slippage(&security(), &market_order()), 0.0);
    }

    #[test]
    fn bps_of_current_price() {
        let model = SpreadBpsSlippageModel::new(5.0);
        // 5 bps of $100 = $0.05
        assert!((model.slippage(&security(), &market_order()) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn passive_limit_orders_take_none() {
        let model = SpreadBpsSlippageModel::new(5.0);
        let order = Order::from_request(
            OrderId(1),
            OrderRequest::limit(Symbol::equity("SPY"), 100, 99.0),
            Utc::now(),
        );
        assert_eq!(model.slippage(&security(), &order), 0.0);
    }
}
