//! Fee models. All fees are in account currency and never negative.

use super::FeeModel;
use crate::domain::{Order, Security};

/// No transaction costs.
pub struct ZeroFeeModel;

impl FeeModel for ZeroFeeModel {
    fn fee(&self, _security: &Security, _order: &Order, _conversion_rate: f64) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "ZeroFeeModel"
    }
}

/// A fixed fee per order, regardless of size.
pub struct FlatFeeModel {
    pub fee: f64,
}

impl FlatFeeModel {
    pub fn new(fee: f64) -> Self {
        Self { fee }
    }
}

impl FeeModel for FlatFeeModel {
    fn fee(&self, _security: &Security, _order: &Order, _conversion_rate: f64) -> f64 {
        self.fee.max(0.0)
    }

    fn name(&self) -> &str {
        "FlatFeeModel"
    }
}

/// Per-share pricing with an order minimum, the common US equity schedule.
pub struct PerShareFeeModel {
    pub fee_per_share: f64,
    pub minimum: f64,
}

impl PerShareFeeModel {
    pub fn new(fee_per_share: f64, minimum: f64) -> Self {
        Self {
            fee_per_share,
            minimum,
        }
    }
}

impl Default for PerShareFeeModel {
    /// $0.005/share with a $1 minimum.
    fn default() -> Self {
        Self::new(0.005, 1.0)
    }
}

impl FeeModel for PerShareFeeModel {
    fn fee(&self, _security: &Security, order: &Order, _conversion_rate: f64) -> f64 {
        (order.quantity.abs() as f64 * self.fee_per_share).max(self.minimum).max(0.0)
    }

    fn name(&self) -> &str {
        "PerShareFeeModel"
    }
}

/// A fraction of order notional, converted into account currency.
pub struct PercentFeeModel {
    pub rate: f64,
}

impl PercentFeeModel {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }
}

impl FeeModel for PercentFeeModel {
    fn fee(&self, security: &Security, order: &Order, conversion_rate: f64) -> f64 {
        let notional = order.quantity.abs() as f64
            * security.price()
            * security.properties.contract_multiplier
            * conversion_rate;
        (notional * self.rate).max(0.0)
    }

    fn name(&self) -> &str {
        "PercentFeeModel"
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

    fn order(qty: i64) -> Order {
        Order::from_request(
            OrderId(1),
            OrderRequest::market(Symbol::equity("SPY"), qty),
            Utc::now(),
        )
    }

    #[test]
    fn zero_fee_is_zero() {
        assert_eq!(ZeroFeeModel.fee(&security(), &order(1_000), 1.0), 0.0);
    }

    #[test]
    fn flat_fee_ignores_size() {
        let model = FlatFeeModel::new(1.0);
        assert_eq!(model.fee(&security(), &order(1), 1.0), 1.0);
        assert_eq!(model.fee(&security(), &order(100_000), 1.0), 1.0);
    }

    #[test]
    fn per_share_respects_minimum() {
        let model = PerShareFeeModel::new(0.005, 1.0);
        // 100 shares * 0.005 = 0.50 -> clamped to the $1 minimum
        assert_eq!(model.fee(&security(), &order(100), 1.0), 1.0);
        // 1000 shares * 0.005 = 5.00
        assert_eq!(model.fee(&security(), &order(1_000), 1.0), 5.0);
        // Sells cost the same as buys
        assert_eq!(model.fee(&security(), &order(-1_000), 1.0), 5.0);
    }

    #[test]
    fn percent_fee_scales_with_notional_and_conversion() {
        let model = PercentFeeModel::new(0.001);
        // 100 shares * $100 * rate 0.001 = $10
        assert_eq!(model.fee(&security(), &order(100), 1.0), 10.0);
        // Half the conversion rate, half the fee
        assert_eq!(model.fee(&security(), &order(100), 0.5), 5.0);
    }

    #[test]
    fn fees_are_never_negative() {
        let model = FlatFeeModel::new(-5.0);
        assert_eq!(model.fee(&security(), &order(100), 1.0), 0.0);
    }
}
