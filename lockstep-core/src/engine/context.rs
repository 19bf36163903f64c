//! The running-state context handed to strategy callbacks.
//!
//! This is the query-and-order surface: simulated time, holdings, cash,
//! margin, open orders, and submit/update/cancel. There are deliberately no
//! configuration mutators here — configuration ended when the engine
//! started.

use crate::brokerage::Brokerage;
use crate::domain::{
    Holding, Order, OrderEvent, OrderId, OrderRequest, OrderStatus, Securities, Symbol,
    UpdateOrderFields,
};
use crate::orders::{OrderResponse, OrderTicket, TransactionManager};
use crate::portfolio::Portfolio;
use crate::time::TimeKeeper;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::warn;

/// Whether fills are simulated by the engine's own pipeline or reported by
/// an external brokerage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Backtest,
    Live,
}

/// Mutable run state, exclusively owned by the simulation-loop thread.
pub struct AlgorithmContext {
    pub time: TimeKeeper,
    pub securities: Securities,
    pub portfolio: Portfolio,
    pub transactions: TransactionManager,
    pub(crate) brokerage: Option<Box<dyn Brokerage>>,
    pub(crate) mode: EngineMode,
    pub(crate) warming_up: bool,
}

impl AlgorithmContext {
    pub(crate) fn new(
        time: TimeKeeper,
        securities: Securities,
        portfolio: Portfolio,
        mode: EngineMode,
    ) -> Self {
        Self {
            time,
            securities,
            portfolio,
            transactions: TransactionManager::new(),
            brokerage: None,
            mode,
            warming_up: false,
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn utc_time(&self) -> DateTime<Utc> {
        self.time.utc()
    }

    pub fn local_time(&self, exchange: &str) -> DateTime<FixedOffset> {
        self.time.local_time(exchange)
    }

    pub fn is_warming_up(&self) -> bool {
        self.warming_up
    }

    pub fn holding(&self, symbol: &Symbol) -> Holding {
        self.portfolio.holding(symbol)
    }

    pub fn cash(&self) -> f64 {
        self.portfolio.cash_book.account_balance()
    }

    pub fn total_portfolio_value(&self) -> f64 {
        self.portfolio.total_portfolio_value(&self.securities)
    }

    pub fn margin_remaining(&self) -> f64 {
        self.portfolio.margin_remaining(&self.securities)
    }

    pub fn open_orders(&self) -> Vec<&Order> {
        self.transactions.open_orders()
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.transactions.order(id)
    }

    // ── Orders ─────────────────────────────────────────────────────────

    /// Submit an order. Validation failures come back as an `Invalid`
    /// ticket (and an `Invalid` order event on the next drain), never as an
    /// error.
    pub fn submit_order(&mut self, request: OrderRequest) -> OrderTicket {
        let ticket = self.transactions.submit_order(
            request,
            &self.securities,
            &self.portfolio,
            self.time.utc(),
            self.warming_up,
        );
        if ticket.status == OrderStatus::Submitted {
            self.route_to_brokerage(ticket.order_id);
        }
        ticket
    }

    pub fn update_order(&mut self, id: OrderId, fields: UpdateOrderFields) -> OrderResponse {
        if let (Some(brokerage), Some(order)) = (&mut self.brokerage, self.transactions.order(id)) {
            if order.is_open() {
                if let Err(err) = brokerage.update_order(order, &fields) {
                    return OrderResponse {
                        order_id: id,
                        code: crate::orders::ResponseCode::UpdateRejected,
                        message: err.to_string(),
                    };
                }
            }
        }
        self.transactions.update_order(id, fields)
    }

    pub fn cancel_order(&mut self, id: OrderId, tag: impl Into<String>) -> OrderResponse {
        let response = self.transactions.cancel_order(id, tag, self.time.utc());
        if response.is_success() {
            if let (Some(brokerage), Some(order)) =
                (&mut self.brokerage, self.transactions.order(id))
            {
                if let Err(err) = brokerage.cancel_order(order) {
                    warn!(order_id = %id, %err, "brokerage cancel failed");
                }
            }
        }
        response
    }

    /// Close the position in `symbol` with a market order. Engine-internal
    /// liquidations (margin calls, delistings, terminal liquidation) also
    /// come through here and bypass submit-time validation.
    pub fn liquidate(&mut self, symbol: &Symbol, tag: &str) -> Option<OrderTicket> {
        let holding = self.portfolio.holding(symbol);
        if holding.is_flat() {
            return None;
        }
        let request = OrderRequest::market(symbol.clone(), -holding.quantity).with_tag(tag);
        Some(self.submit_unchecked(request))
    }

    /// Submit without validation. Reserved for engine-generated liquidating
    /// orders, which must not be blocked by buying-power or delisting
    /// checks.
    pub(crate) fn submit_unchecked(&mut self, request: OrderRequest) -> OrderTicket {
        let ticket = self
            .transactions
            .submit_unchecked(request, self.time.utc());
        self.route_to_brokerage(ticket.order_id);
        ticket
    }

    fn route_to_brokerage(&mut self, id: OrderId) {
        let Some(brokerage) = &mut self.brokerage else {
            return;
        };
        let Some(order) = self.transactions.order(id) else {
            return;
        };
        match brokerage.place_order(order) {
            Ok(broker_id) => self.transactions.add_broker_id(id, broker_id),
            Err(err) => {
                warn!(order_id = %id, %err, "brokerage rejected order");
                let _ = self.transactions.cancel_order(
                    id,
                    format!("brokerage rejected: {err}"),
                    self.time.utc(),
                );
            }
        }
    }

    // ── Fill pipeline (engine-internal) ────────────────────────────────

    /// Run the fill pipeline (backtest only) and drain all pending order
    /// events into the portfolio. Returns the applied events for forwarding
    /// to the strategy.
    pub(crate) fn scan_and_drain(&mut self) -> Vec<OrderEvent> {
        if self.mode == EngineMode::Backtest {
            self.transactions
                .scan_for_fills(&self.securities, &self.portfolio, self.time.utc());
        }
        self.transactions
            .drain_events(&self.securities, &mut self.portfolio)
    }
}
