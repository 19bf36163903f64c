//! Pluggable execution models: fill, fee, slippage, margin, settlement.
//!
//! Each security owns one instance of each kind. The four concerns are
//! deliberately independent traits rather than one broker simulation:
//! real brokerages have independent fee schedules, execution-quality
//! characteristics, and margin policies, and tests substitute each one
//! separately.

pub mod fee;
pub mod fill;
pub mod margin;
pub mod settlement;
pub mod slippage;

pub use fee::{FlatFeeModel, PerShareFeeModel, PercentFeeModel, ZeroFeeModel};
pub use fill::{ImmediateFillModel, VolumeShareFillModel};
pub use margin::SecurityMarginModel;
pub use settlement::{DelayedSettlementModel, ImmediateSettlementModel};
pub use slippage::{SpreadBpsSlippageModel, ZeroSlippageModel};

use crate::domain::{Holding, Order, OrderRequest, Security};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("no usable price for {symbol} (price={price})")]
    BadPrice { symbol: String, price: f64 },
}

/// A single execution produced by a fill model. The order manager derives
/// the resulting status from the remaining quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    /// Signed quantity, same sign as the order; |quantity| never exceeds the
    /// unfilled remainder.
    pub quantity: i64,
}

/// Computes executions for working orders against current market data.
pub trait FillModel: Send + Sync {
    /// Attempt to fill the unfilled remainder of `order`. `slippage` is the
    /// (non-negative) adverse price deviation estimated by the slippage
    /// model; the fill model decides how to apply it. Returns `Ok(None)`
    /// when the order cannot fill on this data.
    fn fill(
        &self,
        security: &Security,
        order: &Order,
        remaining: i64,
        slippage: f64,
    ) -> Result<Option<Fill>, ModelError>;

    fn name(&self) -> &str;
}

/// Computes the transaction cost of an order, in account currency.
///
/// Queried once per order, on the first fill. Implementations must return a
/// non-negative value; the accounting engine additionally assumes fees are
/// monotonic in absolute order value for reasonable models.
pub trait FeeModel: Send + Sync {
    fn fee(&self, security: &Security, order: &Order, conversion_rate: f64) -> f64;
    fn name(&self) -> &str;
}

/// Estimates adverse price deviation for an order. The returned value is a
/// deviation, not a price; the fill model applies it directionally.
pub trait SlippageModel: Send + Sync {
    fn slippage(&self, security: &Security, order: &Order) -> f64;
    fn name(&self) -> &str;
}

/// Margin policy for one security.
pub trait MarginModel: Send + Sync {
    /// Margin required to open `order`, in account currency.
    fn initial_margin(&self, security: &Security, order: &Order, conversion_rate: f64) -> f64;

    /// Margin currently locked by `holding`, in account currency.
    fn maintenance_margin(
        &self,
        security: &Security,
        holding: &Holding,
        conversion_rate: f64,
    ) -> f64;

    fn leverage(&self) -> f64;

    /// A liquidating order that frees at least `margin_deficit` of
    /// maintenance margin, capped at the full holding. `None` when flat or
    /// when no price is available to size the order.
    fn margin_call_order(
        &self,
        security: &Security,
        holding: &Holding,
        conversion_rate: f64,
        margin_deficit: f64,
    ) -> Option<OrderRequest>;

    fn name(&self) -> &str;
}

/// When the cash proceeds of a trade become available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettlementTerms {
    Immediate,
    Delayed { available_at: DateTime<Utc> },
}

/// Settlement policy: credits may be deferred (T+N); debits always apply
/// immediately.
pub trait SettlementModel: Send + Sync {
    fn settle(&self, time: DateTime<Utc>, amount: f64) -> SettlementTerms;
    fn name(&self) -> &str;
}

/// The model set owned by one security.
pub struct ModelSet {
    pub fill: Box<dyn FillModel>,
    pub fee: Box<dyn FeeModel>,
    pub slippage: Box<dyn SlippageModel>,
    pub margin: Box<dyn MarginModel>,
    pub settlement: Box<dyn SettlementModel>,
}

impl ModelSet {
    /// Defaults: immediate fills, no fees, no slippage, 2x margin, immediate
    /// settlement.
    pub fn default_set() -> Self {
        Self {
            fill: Box::new(ImmediateFillModel),
            fee: Box::new(ZeroFeeModel),
            slippage: Box::new(ZeroSlippageModel),
            margin: Box::new(SecurityMarginModel::new(2.0)),
            settlement: Box::new(ImmediateSettlementModel),
        }
    }
}

impl std::fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSet")
            .field("fill", &self.fill.name())
            .field("fee", &self.fee.name())
            .field("slippage", &self.slippage.name())
            .field("margin", &self.margin.name())
            .field("settlement", &self.settlement.name())
            .finish()
    }
}
