//! The strategy-facing surface: the `Algorithm` trait, the typed callback
//! registration table, and the two-phase configuration builder.

use super::context::AlgorithmContext;
use super::schedule::ScheduledEvent;
use crate::domain::{
    Bar, Delisting, Dividend, OrderEvent, OrderRequest, SecurityChanges, SecuritySeed, Split,
    Symbol, TimeSlice,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// An error surfaced from strategy code. Stored as the run's fatal error and
/// never allowed to propagate past the loop.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AlgorithmError(pub String);

impl From<String> for AlgorithmError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for AlgorithmError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Which data-kind callbacks the strategy implements, declared once at
/// initialization. The loop consults this table every slice instead of
/// probing for overrides dynamically.
///
/// Order events, margin calls, and scheduled events are always delivered;
/// only data-shaped callbacks are gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackSet {
    pub on_data: bool,
    pub on_bars: bool,
    pub on_securities_changed: bool,
    pub on_dividends: bool,
    pub on_splits: bool,
    pub on_delistings: bool,
    pub on_end_of_day: bool,
}

impl Default for CallbackSet {
    /// Only the unified data handler.
    fn default() -> Self {
        Self {
            on_data: true,
            on_bars: false,
            on_securities_changed: false,
            on_dividends: false,
            on_splits: false,
            on_delistings: false,
            on_end_of_day: false,
        }
    }
}

impl CallbackSet {
    pub fn all() -> Self {
        Self {
            on_data: true,
            on_bars: true,
            on_securities_changed: true,
            on_dividends: true,
            on_splits: true,
            on_delistings: true,
            on_end_of_day: true,
        }
    }
}

/// Configuration assembled during `Algorithm::initialize`.
///
/// This is the only mutable configuration surface; once the engine starts,
/// the running state exposes no mutators, so late configuration attempts are
/// rejected by the type system rather than a runtime flag.
#[derive(Debug, Default)]
pub struct AlgorithmConfig {
    pub(crate) securities: Vec<SecuritySeed>,
    pub(crate) callbacks: CallbackSet,
    pub(crate) warmup: Option<Duration>,
    pub(crate) scheduled: Vec<ScheduledEvent>,
    pub(crate) benchmark: Option<Symbol>,
}

impl AlgorithmConfig {
    pub fn new() -> Self {
        Self {
            callbacks: CallbackSet::default(),
            ..Self::default()
        }
    }

    /// Subscribe to a security. Duplicate symbols are ignored at build time.
    pub fn subscribe(&mut self, seed: SecuritySeed) -> &mut Self {
        self.securities.push(seed);
        self
    }

    pub fn set_callbacks(&mut self, callbacks: CallbackSet) -> &mut Self {
        self.callbacks = callbacks;
        self
    }

    /// Replay this much history before the run proper.
    pub fn set_warmup(&mut self, period: Duration) -> &mut Self {
        self.warmup = Some(period);
        self
    }

    /// Register a time-triggered callback.
    pub fn schedule(
        &mut self,
        name: impl Into<String>,
        first_fire: DateTime<Utc>,
        period: Option<Duration>,
    ) -> &mut Self {
        self.scheduled.push(ScheduledEvent {
            name: name.into(),
            next_fire: first_fire,
            period,
        });
        self
    }

    /// Symbol sampled alongside equity at each day boundary.
    pub fn set_benchmark(&mut self, symbol: Symbol) -> &mut Self {
        self.benchmark = Some(symbol);
        self
    }
}

/// A trading strategy.
///
/// Every callback may fail; failures are caught at the loop boundary,
/// stored as the run's fatal error, and end the run — they never unwind
/// through the engine. All callbacks run on the loop thread, strictly
/// sequentially.
#[allow(unused_variables)]
pub trait Algorithm: Send {
    /// Declare subscriptions, callbacks, warm-up, and schedules.
    fn initialize(&mut self, config: &mut AlgorithmConfig) -> Result<(), AlgorithmError>;

    /// Unified handler: the whole slice.
    fn on_data(
        &mut self,
        slice: &TimeSlice,
        ctx: &mut AlgorithmContext,
    ) -> Result<(), AlgorithmError> {
        Ok(())
    }

    /// Bar-shaped data only, when registered.
    fn on_bars(
        &mut self,
        bars: &HashMap<Symbol, Bar>,
        ctx: &mut AlgorithmContext,
    ) -> Result<(), AlgorithmError> {
        Ok(())
    }

    fn on_order_event(
        &mut self,
        event: &OrderEvent,
        ctx: &mut AlgorithmContext,
    ) -> Result<(), AlgorithmError> {
        Ok(())
    }

    fn on_securities_changed(
        &mut self,
        changes: &SecurityChanges,
        ctx: &mut AlgorithmContext,
    ) -> Result<(), AlgorithmError> {
        Ok(())
    }

    fn on_dividend(
        &mut self,
        dividend: &Dividend,
        ctx: &mut AlgorithmContext,
    ) -> Result<(), AlgorithmError> {
        Ok(())
    }

    fn on_split(&mut self, split: &Split, ctx: &mut AlgorithmContext) -> Result<(), AlgorithmError> {
        Ok(())
    }

    fn on_delisting(
        &mut self,
        delisting: &Delisting,
        ctx: &mut AlgorithmContext,
    ) -> Result<(), AlgorithmError> {
        Ok(())
    }

    /// Margin call about to be executed. The strategy may adjust or clear
    /// the liquidation orders before they are submitted.
    fn on_margin_call(
        &mut self,
        requests: &mut Vec<OrderRequest>,
        ctx: &mut AlgorithmContext,
    ) -> Result<(), AlgorithmError> {
        Ok(())
    }

    /// Margin remaining has dropped to the warning threshold.
    fn on_margin_call_warning(&mut self, ctx: &mut AlgorithmContext) -> Result<(), AlgorithmError> {
        Ok(())
    }

    fn on_scheduled_event(
        &mut self,
        name: &str,
        ctx: &mut AlgorithmContext,
    ) -> Result<(), AlgorithmError> {
        Ok(())
    }

    fn on_end_of_day(
        &mut self,
        date: NaiveDate,
        ctx: &mut AlgorithmContext,
    ) -> Result<(), AlgorithmError> {
        Ok(())
    }

    fn on_end_of_algorithm(&mut self, ctx: &mut AlgorithmContext) -> Result<(), AlgorithmError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_callbacks_gate_everything_but_on_data() {
        let set = CallbackSet::default();
        assert!(set.on_data);
        assert!(!set.on_bars);
        assert!(!set.on_dividends);
    }

    #[test]
    fn config_builder_accumulates() {
        let mut config = AlgorithmConfig::new();
        config
            .subscribe(SecuritySeed::us_equity("SPY"))
            .set_warmup(Duration::days(2))
            .set_callbacks(CallbackSet::all())
            .set_benchmark(Symbol::equity("SPY"));
        assert_eq!(config.securities.len(), 1);
        assert_eq!(config.warmup, Some(Duration::days(2)));
        assert!(config.callbacks.on_bars);
        assert!(config.benchmark.is_some());
    }
}
