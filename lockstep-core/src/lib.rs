//! Lockstep Core — deterministic event-driven trading engine.
//!
//! This crate contains the heart of the engine:
//! - Domain types (symbols, securities, holdings, cash, orders, fills, slices)
//! - The slice-by-slice simulation loop with its fixed dispatch order
//! - The transaction manager and forward-only order status machine
//! - Pluggable fill/fee/slippage/margin/settlement models
//! - Portfolio accounting with crossing-aware average-price updates
//! - Corporate actions (dividends, splits, delistings) applied mid-stream

pub mod brokerage;
pub mod domain;
pub mod engine;
pub mod feed;
pub mod fingerprint;
pub mod models;
pub mod orders;
pub mod portfolio;
pub mod settings;
pub mod time;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the types that cross the loop-thread boundary
    /// are Send. Feeds, brokerages, and the status channel run on other
    /// threads; if one of these stops being Send the build breaks here
    /// instead of at an integration site.
    #[allow(dead_code)]
    fn assert_send() {
        fn require_send<T: Send>() {}

        require_send::<domain::TimeSlice>();
        require_send::<domain::OrderEvent>();
        require_send::<domain::Order>();
        require_send::<domain::SecuritySeed>();
        require_send::<brokerage::BrokerageMessage>();
        require_send::<engine::StatusUpdate>();
        require_send::<engine::ControlHandle>();
        require_send::<feed::VecFeed>();
        require_send::<feed::ChannelFeed>();
    }

    /// Architecture contract: strategy code cannot mutate holdings. The
    /// `Holding` returned by context queries is a value copy, and the only
    /// holding writers live in the portfolio module.
    #[test]
    fn holdings_are_read_only_to_strategies() {
        fn _returns_a_copy(
            ctx: &engine::AlgorithmContext,
            symbol: &domain::Symbol,
        ) -> domain::Holding {
            ctx.holding(symbol)
        }
    }
}
