//! Fill models.
//!
//! - Market orders fill at the current price adjusted by slippage.
//! - Limit orders fill at the limit when the bar's range (or the quote's
//!   touch) makes it marketable; passive fills take no slippage.
//! - Stop orders trigger off the bar's extremes, then fill as market.
//! - MOO/MOC fill at the session bar's open/close.

use super::{Fill, FillModel, ModelError};
use crate::domain::{Order, OrderDirection, OrderType, Security};

/// Signed adverse slippage: buys pay more, sells receive less.
fn slipped(price: f64, direction: OrderDirection, slippage: f64) -> f64 {
    match direction {
        OrderDirection::Buy => price + slippage,
        OrderDirection::Sell => price - slippage,
    }
}

/// Low/high range visible to trigger checks: the last bar's extremes, or the
/// quote's touch prices when only quotes exist.
fn visible_range(security: &Security) -> Option<(f64, f64)> {
    if let Some(bar) = &security.last_bar {
        Some((bar.low, bar.high))
    } else {
        security.last_quote.map(|q| (q.bid, q.ask))
    }
}

fn check_price(security: &Security, price: f64) -> Result<f64, ModelError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(ModelError::BadPrice {
            symbol: security.symbol.to_string(),
            price,
        });
    }
    Ok(price)
}

/// Core fill logic shared by the concrete models. Returns the execution for
/// the full remainder; callers may cap the quantity afterwards.
fn evaluate(
    security: &Security,
    order: &Order,
    remaining: i64,
    slippage: f64,
) -> Result<Option<Fill>, ModelError> {
    if remaining == 0 || !security.has_data() {
        return Ok(None);
    }
    let direction = order.direction();

    let price = match order.order_type {
        OrderType::Market => slipped(check_price(security, security.price())?, direction, slippage),
        OrderType::MarketOnOpen => {
            slipped(check_price(security, security.open_price())?, direction, slippage)
        }
        OrderType::MarketOnClose => {
            let close = security.last_bar.map_or_else(|| security.price(), |b| b.close);
            slipped(check_price(security, close)?, direction, slippage)
        }
        OrderType::Limit { limit_price } => {
            let (low, high) = match visible_range(security) {
                Some(range) => range,
                None => return Ok(None),
            };
            let marketable = match direction {
                OrderDirection::Buy => low <= limit_price,
                OrderDirection::Sell => high >= limit_price,
            };
            if !marketable {
                return Ok(None);
            }
            check_price(security, limit_price)?
        }
        OrderType::StopMarket { stop_price } => {
            let (low, high) = match visible_range(security) {
                Some(range) => range,
                None => return Ok(None),
            };
            let triggered = match direction {
                OrderDirection::Buy => high >= stop_price,
                OrderDirection::Sell => low <= stop_price,
            };
            if !triggered {
                return Ok(None);
            }
            slipped(check_price(security, stop_price)?, direction, slippage)
        }
        OrderType::StopLimit {
            stop_price,
            limit_price,
        } => {
            let (low, high) = match visible_range(security) {
                Some(range) => range,
                None => return Ok(None),
            };
            let triggered = match direction {
                OrderDirection::Buy => high >= stop_price,
                OrderDirection::Sell => low <= stop_price,
            };
            let limit_reachable = match direction {
                OrderDirection::Buy => low <= limit_price,
                OrderDirection::Sell => high >= limit_price,
            };
            if !(triggered && limit_reachable) {
                return Ok(None);
            }
            check_price(security, limit_price)?
        }
    };

    Ok(Some(Fill {
        price,
        quantity: remaining,
    }))
}

/// Fills the entire remainder as soon as the order is marketable.
pub struct ImmediateFillModel;

impl FillModel for ImmediateFillModel {
    fn fill(
        &self,
        security: &Security,
        order: &Order,
        remaining: i64,
        slippage: f64,
    ) -> Result<Option<Fill>, ModelError> {
        evaluate(security, order, remaining, slippage)
    }

    fn name(&self) -> &str {
        "ImmediateFillModel"
    }
}

/// Caps each execution at a fraction of the last bar's volume, producing
/// partial fills for orders large relative to liquidity. Deterministic: the
/// remainder stays working and fills on subsequent data.
pub struct VolumeShareFillModel {
    /// Maximum fraction of the bar's volume one execution may take.
    pub volume_share: f64,
}

impl VolumeShareFillModel {
    pub fn new(volume_share: f64) -> Self {
        Self { volume_share }
    }
}

impl FillModel for VolumeShareFillModel {
    fn fill(
        &self,
        security: &Security,
        order: &Order,
        remaining: i64,
        slippage: f64,
    ) -> Result<Option<Fill>, ModelError> {
        let fill = match evaluate(security, order, remaining, slippage)? {
            Some(fill) => fill,
            None => return Ok(None),
        };

        let cap = (security.last_volume() * self.volume_share).floor() as i64;
        if cap == 0 {
            return Ok(None);
        }
        let capped_abs = fill.quantity.abs().min(cap);
        let quantity = capped_abs * fill.quantity.signum();
        Ok(Some(Fill {
            price: fill.price,
            quantity,
        }))
    }

    fn name(&self) -> &str {
        "VolumeShareFillModel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, OrderId, OrderRequest, Quote, SecuritySeed, Symbol};
    use chrono::Utc;

    fn security_with_bar(bar: Bar) -> Security {
        let mut sec = Security::from_seed(SecuritySeed::us_equity("SPY"));
        sec.update_bar(bar);
        sec
    }

    fn order(request: OrderRequest) -> Order {
        Order::from_request(OrderId(1), request, Utc::now())
    }

    fn range_bar() -> Bar {
        Bar {
            open: 100.0,
            high: 102.0,
            low: 98.0,
            close: 101.0,
            volume: 10_000.0,
        }
    }

    #[test]
    fn market_buy_fills_at_price_plus_slippage() {
        let sec = security_with_bar(range_bar());
        let o = order(OrderRequest::market(Symbol::equity("SPY"), 100));
        let fill = ImmediateFillModel.fill(&sec, &o, 100, 0.05).unwrap().unwrap();
        assert_eq!(fill.price, 101.05);
        assert_eq!(fill.quantity, 100);
    }

    #[test]
    fn market_sell_fills_at_price_minus_slippage() {
        let sec = security_with_bar(range_bar());
        let o = order(OrderRequest::market(Symbol::equity("SPY"), -100));
        let fill = ImmediateFillModel.fill(&sec, &o, -100, 0.05).unwrap().unwrap();
        assert_eq!(fill.price, 100.95);
        assert_eq!(fill.quantity, -100);
    }

    #[test]
    fn limit_buy_requires_touch() {
        let sec = security_with_bar(range_bar()); // low = 98
        let o = order(OrderRequest::limit(Symbol::equity("SPY"), 100, 97.0));
        assert!(ImmediateFillModel.fill(&sec, &o, 100, 0.0).unwrap().is_none());

        let o = order(OrderRequest::limit(Symbol::equity("SPY"), 100, 99.0));
        let fill = ImmediateFillModel.fill(&sec, &o, 100, 0.0).unwrap().unwrap();
        assert_eq!(fill.price, 99.0); // passive fill, no slippage
    }

    #[test]
    fn limit_sell_requires_touch() {
        let sec = security_with_bar(range_bar()); // high = 102
        let o = order(OrderRequest::limit(Symbol::equity("SPY"), -100, 103.0));
        assert!(ImmediateFillModel.fill(&sec, &o, -100, 0.0).unwrap().is_none());

        let o = order(OrderRequest::limit(Symbol::equity("SPY"), -100, 101.5));
        let fill = ImmediateFillModel.fill(&sec, &o, -100, 0.0).unwrap().unwrap();
        assert_eq!(fill.price, 101.5);
    }

    #[test]
    fn stop_sell_triggers_on_low() {
        let sec = security_with_bar(range_bar()); // low = 98
        let mut req = OrderRequest::market(Symbol::equity("SPY"), -100);
        req.order_type = OrderType::StopMarket { stop_price: 99.0 };
        let o = order(req);
        let fill = ImmediateFillModel.fill(&sec, &o, -100, 0.1).unwrap().unwrap();
        assert_eq!(fill.price, 98.9); // stop price minus slippage
    }

    #[test]
    fn stop_buy_does_not_trigger_below_stop() {
        let sec = security_with_bar(range_bar()); // high = 102
        let mut req = OrderRequest::market(Symbol::equity("SPY"), 100);
        req.order_type = OrderType::StopMarket { stop_price: 105.0 };
        let o = order(req);
        assert!(ImmediateFillModel.fill(&sec, &o, 100, 0.0).unwrap().is_none());
    }

    #[test]
    fn stop_limit_needs_both_conditions() {
        let sec = security_with_bar(range_bar());
        // Sell stop-limit: stop 99 triggers (low 98), but the 103 limit is
        // out of range (high 102), so no fill.
        let mut req = OrderRequest::market(Symbol::equity("SPY"), -100);
        req.order_type = OrderType::StopLimit {
            stop_price: 99.0,
            limit_price: 103.0,
        };
        let o = order(req);
        // Sell limit 103 reachable only if high >= 103; high is 102.
        assert!(ImmediateFillModel.fill(&sec, &o, -100, 0.0).unwrap().is_none());
    }

    #[test]
    fn moo_and_moc_use_bar_edges() {
        let sec = security_with_bar(range_bar());
        let mut req = OrderRequest::market(Symbol::equity("SPY"), 10);
        req.order_type = OrderType::MarketOnOpen;
        let fill = ImmediateFillModel
            .fill(&sec, &order(req), 10, 0.0)
            .unwrap()
            .unwrap();
        assert_eq!(fill.price, 100.0);

        let mut req = OrderRequest::market(Symbol::equity("SPY"), 10);
        req.order_type = OrderType::MarketOnClose;
        let fill = ImmediateFillModel
            .fill(&sec, &order(req), 10, 0.0)
            .unwrap()
            .unwrap();
        assert_eq!(fill.price, 101.0);
    }

    #[test]
    fn no_data_means_no_fill() {
        let sec = Security::from_seed(SecuritySeed::us_equity("SPY"));
        let o = order(OrderRequest::market(Symbol::equity("SPY"), 100));
        assert!(ImmediateFillModel.fill(&sec, &o, 100, 0.0).unwrap().is_none());
    }

    #[test]
    fn quote_only_market_fill() {
        let mut sec = Security::from_seed(SecuritySeed::us_equity("SPY"));
        sec.update_quote(Quote::new(99.0, 101.0));
        let o = order(OrderRequest::market(Symbol::equity("SPY"), 100));
        let fill = ImmediateFillModel.fill(&sec, &o, 100, 0.0).unwrap().unwrap();
        assert_eq!(fill.price, 100.0); // mid
    }

    #[test]
    fn bad_price_is_a_model_error() {
        let sec = security_with_bar(Bar::at(0.0, 1_000.0));
        let o = order(OrderRequest::market(Symbol::equity("SPY"), 100));
        assert!(ImmediateFillModel.fill(&sec, &o, 100, 0.0).is_err());
    }

    #[test]
    fn volume_share_caps_fill_quantity() {
        let sec = security_with_bar(Bar::at(100.0, 200.0)); // volume 200
        let model = VolumeShareFillModel::new(0.3); // cap = 60
        let o = order(OrderRequest::market(Symbol::equity("SPY"), 100));

        let fill = model.fill(&sec, &o, 100, 0.0).unwrap().unwrap();
        assert_eq!(fill.quantity, 60);

        // Remainder fills on the next pass.
        let fill = model.fill(&sec, &o, 40, 0.0).unwrap().unwrap();
        assert_eq!(fill.quantity, 40);
    }

    #[test]
    fn volume_share_caps_sells_symmetrically() {
        let sec = security_with_bar(Bar::at(100.0, 200.0));
        let model = VolumeShareFillModel::new(0.3);
        let o = order(OrderRequest::market(Symbol::equity("SPY"), -100));
        let fill = model.fill(&sec, &o, -100, 0.0).unwrap().unwrap();
        assert_eq!(fill.quantity, -60);
    }

    #[test]
    fn volume_share_zero_cap_no_fill() {
        let sec = security_with_bar(Bar::at(100.0, 2.0));
        let model = VolumeShareFillModel::new(0.3); // cap = floor(0.6) = 0
        let o = order(OrderRequest::market(Symbol::equity("SPY"), 100));
        assert!(model.fill(&sec, &o, 100, 0.0).unwrap().is_none());
    }
}
