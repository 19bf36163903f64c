//! Margin models.

use super::MarginModel;
use crate::domain::{Holding, Order, OrderRequest, Security};

/// Leverage-based margin: initial and maintenance requirements are the
/// position's absolute value divided by the leverage.
pub struct SecurityMarginModel {
    leverage: f64,
}

impl SecurityMarginModel {
    pub fn new(leverage: f64) -> Self {
        assert!(leverage >= 1.0, "leverage below 1x is not meaningful");
        Self { leverage }
    }

    /// Cash-account behavior: every position fully collateralized.
    pub fn cash_account() -> Self {
        Self::new(1.0)
    }
}

impl MarginModel for SecurityMarginModel {
    fn initial_margin(&self, security: &Security, order: &Order, conversion_rate: f64) -> f64 {
        let notional = order.quantity.abs() as f64
            * security.price()
            * security.properties.contract_multiplier
            * conversion_rate;
        notional / self.leverage
    }

    fn maintenance_margin(
        &self,
        security: &Security,
        holding: &Holding,
        conversion_rate: f64,
    ) -> f64 {
        holding.absolute_value(
            security.price(),
            security.properties.contract_multiplier,
            conversion_rate,
        ) / self.leverage
    }

    fn leverage(&self) -> f64 {
        self.leverage
    }

    fn margin_call_order(
        &self,
        security: &Security,
        holding: &Holding,
        conversion_rate: f64,
        margin_deficit: f64,
    ) -> Option<OrderRequest> {
        if holding.is_flat() || margin_deficit <= 0.0 {
            return None;
        }
        let price = security.price();
        if price <= 0.0 {
            return None;
        }

        // Margin freed per unit liquidated.
        let per_unit =
            price * security.properties.contract_multiplier * conversion_rate / self.leverage;
        if per_unit <= 0.0 {
            return None;
        }

        let required = (margin_deficit / per_unit).ceil() as i64;
        let quantity = required.min(holding.abs_quantity());
        if quantity == 0 {
            return None;
        }

        // Liquidate toward flat: sell longs, buy back shorts.
        let signed = -holding.quantity.signum() * quantity;
        Some(OrderRequest::market(security.symbol.clone(), signed).with_tag("margin call"))
    }

    fn name(&self) -> &str {
        "SecurityMarginModel"
    }
}
