//! The transaction manager: order intake, lifecycle, and the synchronous
//! fill-event drain.
//!
//! Validation failures never reach strategy code as errors — they come back
//! as `Invalid` order events, because an exception would halt the whole run.
//! Fills produced by models (backtest) and fills reported by external
//! threads (live brokerage push or polling sweeps) land in the same queue
//! and are applied only inside [`TransactionManager::drain_events`], the
//! single point where holdings may change.

use crate::domain::{
    IdGen, Order, OrderEvent, OrderId, OrderRequest, OrderStatus, OrderType, Securities, Split,
    Symbol, TimeInForce, UpdateOrderFields,
};
use crate::portfolio::Portfolio;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::warn;

/// Handle returned synchronously from a submit call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderTicket {
    pub order_id: OrderId,
    /// Status at submit time: `Submitted`, or `Invalid` when validation
    /// failed.
    pub status: OrderStatus,
}

/// Error codes for update/cancel responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    UnknownOrderId,
    /// The order is in a terminal state.
    InvalidOrderStatus,
    /// The requested change is not supported for this order.
    UpdateRejected,
}

/// Result object for update/cancel calls. Never a panic, never an `Err` into
/// strategy code.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub code: ResponseCode,
    pub message: String,
}

impl OrderResponse {
    fn ok(order_id: OrderId) -> Self {
        Self {
            order_id,
            code: ResponseCode::Ok,
            message: String::new(),
        }
    }

    fn error(order_id: OrderId, code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            order_id,
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ResponseCode::Ok
    }
}

/// Per-order reconciliation state. One table replaces the parallel hash
/// sets a reconciler otherwise accumulates: duplicate fills (push + poll
/// racing) are rejected by state, not by set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Placed,
    PartiallyFilled,
    Closed,
}

struct OrderRecord {
    order: Order,
    /// The fee model is queried once per order, on the first fill.
    emitted_fee: bool,
    reconcile: ReconcileState,
}

/// Accepts order requests, assigns ids, tracks lifecycle, runs the fill
/// pipeline, and drains fill events in FIFO order.
pub struct TransactionManager {
    id_gen: IdGen,
    records: HashMap<OrderId, OrderRecord>,
    /// Events awaiting the next synchronous drain.
    queue: VecDeque<OrderEvent>,
    /// Cross-thread intake: live adapters and pollers push here.
    external_rx: Receiver<OrderEvent>,
    external_tx: Sender<OrderEvent>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        let (external_tx, external_rx) = channel();
        Self {
            id_gen: IdGen::default(),
            records: HashMap::new(),
            queue: VecDeque::new(),
            external_rx,
            external_tx,
        }
    }

    /// Sender for external threads to report fills. Events enqueue here and
    /// are applied at the next synchronous drain — external threads never
    /// mutate holdings directly.
    pub fn event_sender(&self) -> Sender<OrderEvent> {
        self.external_tx.clone()
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.records.get(&id).map(|r| &r.order)
    }

    pub fn open_orders(&self) -> Vec<&Order> {
        self.records
            .values()
            .filter(|r| r.order.is_open())
            .map(|r| &r.order)
            .collect()
    }

    pub fn open_orders_for(&self, symbol: &Symbol) -> Vec<&Order> {
        self.records
            .values()
            .filter(|r| r.order.is_open() && r.order.symbol == *symbol)
            .map(|r| &r.order)
            .collect()
    }

    pub fn has_open_orders_for(&self, symbol: &Symbol) -> bool {
        self.records
            .values()
            .any(|r| r.order.is_open() && r.order.symbol == *symbol)
    }

    // ── Submit / update / cancel ───────────────────────────────────────

    /// Validate and accept an order request. Always returns a ticket; a
    /// failed validation yields an `Invalid` ticket and a queued `Invalid`
    /// order event, never an error.
    pub fn submit_order(
        &mut self,
        request: OrderRequest,
        securities: &Securities,
        portfolio: &Portfolio,
        now: DateTime<Utc>,
        warming_up: bool,
    ) -> OrderTicket {
        let id = self.id_gen.next_order_id();
        let order = Order::from_request(id, request, now);

        if let Some(reason) = self.validate(&order, securities, portfolio, warming_up) {
            let event = OrderEvent::invalid(id, order.symbol.clone(), reason, now);
            let mut order = order;
            // New -> Invalid is a legal forward transition.
            order
                .set_status(OrderStatus::Invalid)
                .expect("New -> Invalid is forward");
            self.records.insert(
                id,
                OrderRecord {
                    order,
                    emitted_fee: false,
                    reconcile: ReconcileState::Closed,
                },
            );
            self.queue.push_back(event);
            return OrderTicket {
                order_id: id,
                status: OrderStatus::Invalid,
            };
        }

        let mut order = order;
        order
            .set_status(OrderStatus::Submitted)
            .expect("New -> Submitted is forward");
        let event = OrderEvent::status(id, order.symbol.clone(), OrderStatus::Submitted, "", now);
        self.records.insert(
            id,
            OrderRecord {
                order,
                emitted_fee: false,
                reconcile: ReconcileState::Placed,
            },
        );
        self.queue.push_back(event);
        OrderTicket {
            order_id: id,
            status: OrderStatus::Submitted,
        }
    }

    /// Accept a request without validation. Reserved for engine-generated
    /// liquidating orders (margin calls, delistings, terminal liquidation),
    /// which must not be blocked by buying-power or delisting checks.
    pub fn submit_unchecked(&mut self, request: OrderRequest, now: DateTime<Utc>) -> OrderTicket {
        let id = self.id_gen.next_order_id();
        let mut order = Order::from_request(id, request, now);
        order
            .set_status(OrderStatus::Submitted)
            .expect("New -> Submitted is forward");
        let event = OrderEvent::status(id, order.symbol.clone(), OrderStatus::Submitted, "", now);
        self.records.insert(
            id,
            OrderRecord {
                order,
                emitted_fee: false,
                reconcile: ReconcileState::Placed,
            },
        );
        self.queue.push_back(event);
        OrderTicket {
            order_id: id,
            status: OrderStatus::Submitted,
        }
    }

    /// Attach a broker-assigned identifier to an order.
    pub fn add_broker_id(&mut self, id: OrderId, broker_id: String) {
        if let Some(record) = self.records.get_mut(&id) {
            record.order.broker_ids.push(broker_id);
        }
    }

    fn validate(
        &self,
        order: &Order,
        securities: &Securities,
        portfolio: &Portfolio,
        warming_up: bool,
    ) -> Option<String> {
        if warming_up {
            return Some("orders are not accepted during warm-up".into());
        }
        let security = match securities.get(&order.symbol) {
            Some(s) => s,
            None => return Some(format!("symbol {} is not subscribed", order.symbol)),
        };
        if order.quantity == 0 {
            return Some("order quantity cannot be zero".into());
        }
        match order.order_type {
            OrderType::Limit { limit_price } if limit_price <= 0.0 => {
                return Some("limit price must be positive".into());
            }
            OrderType::StopMarket { stop_price } if stop_price <= 0.0 => {
                return Some("stop price must be positive".into());
            }
            OrderType::StopLimit {
                stop_price,
                limit_price,
            } if stop_price <= 0.0 || limit_price <= 0.0 => {
                return Some("stop and limit prices must be positive".into());
            }
            _ => {}
        }
        if security.delisted {
            return Some(format!("{} is delisted", order.symbol));
        }
        if !security.has_data() {
            return Some(format!("no market data yet for {}", order.symbol));
        }

        let conversion = portfolio
            .cash_book
            .conversion_rate(&security.properties.quote_currency);
        let required = security
            .models
            .margin
            .initial_margin(security, order, conversion);
        let available = portfolio.margin_remaining(securities);
        if required > available {
            return Some(format!(
                "insufficient buying power: required {required:.2}, available {available:.2}"
            ));
        }
        None
    }

    /// Change fields on a working order. Rejected (no state change) when the
    /// order is terminal or the change does not apply to its type.
    pub fn update_order(&mut self, id: OrderId, fields: UpdateOrderFields) -> OrderResponse {
        let record = match self.records.get_mut(&id) {
            Some(r) => r,
            None => return OrderResponse::error(id, ResponseCode::UnknownOrderId, "unknown order"),
        };
        if !record.order.is_open() {
            return OrderResponse::error(
                id,
                ResponseCode::InvalidOrderStatus,
                format!("order is {:?}", record.order.status),
            );
        }

        // Validate the whole update before mutating anything.
        if let Some(quantity) = fields.quantity {
            if quantity == 0 {
                return OrderResponse::error(
                    id,
                    ResponseCode::UpdateRejected,
                    "quantity cannot be zero",
                );
            }
            if quantity.signum() != record.order.quantity.signum()
                || quantity.abs() < record.order.filled_quantity.abs()
            {
                return OrderResponse::error(
                    id,
                    ResponseCode::UpdateRejected,
                    "quantity change conflicts with filled quantity",
                );
            }
        }
        if fields.limit_price.is_some() && record.order.order_type.limit_price().is_none() {
            return OrderResponse::error(
                id,
                ResponseCode::UpdateRejected,
                "order type has no limit price",
            );
        }
        if fields.stop_price.is_some() && record.order.order_type.stop_price().is_none() {
            return OrderResponse::error(
                id,
                ResponseCode::UpdateRejected,
                "order type has no stop price",
            );
        }

        if let Some(quantity) = fields.quantity {
            record.order.quantity = quantity;
        }
        if let Some(new_limit) = fields.limit_price {
            record.order.order_type = match record.order.order_type {
                OrderType::Limit { .. } => OrderType::Limit {
                    limit_price: new_limit,
                },
                OrderType::StopLimit { stop_price, .. } => OrderType::StopLimit {
                    stop_price,
                    limit_price: new_limit,
                },
                other => other,
            };
        }
        if let Some(new_stop) = fields.stop_price {
            record.order.order_type = match record.order.order_type {
                OrderType::StopMarket { .. } => OrderType::StopMarket {
                    stop_price: new_stop,
                },
                OrderType::StopLimit { limit_price, .. } => OrderType::StopLimit {
                    stop_price: new_stop,
                    limit_price,
                },
                other => other,
            };
        }
        if let Some(tag) = fields.tag {
            record.order.tag = tag;
        }
        OrderResponse::ok(id)
    }

    /// Cancel a working order. Stops any pending fill processing for it.
    pub fn cancel_order(
        &mut self,
        id: OrderId,
        tag: impl Into<String>,
        now: DateTime<Utc>,
    ) -> OrderResponse {
        let record = match self.records.get_mut(&id) {
            Some(r) => r,
            None => return OrderResponse::error(id, ResponseCode::UnknownOrderId, "unknown order"),
        };
        if !record.order.is_open() {
            return OrderResponse::error(
                id,
                ResponseCode::InvalidOrderStatus,
                format!("order is {:?}", record.order.status),
            );
        }
        record
            .order
            .set_status(OrderStatus::Canceled)
            .expect("open -> Canceled is forward");
        record.reconcile = ReconcileState::Closed;
        let event = OrderEvent::status(
            id,
            record.order.symbol.clone(),
            OrderStatus::Canceled,
            tag.into(),
            now,
        );
        self.queue.push_back(event);
        OrderResponse::ok(id)
    }

    // ── Fill pipeline ──────────────────────────────────────────────────

    /// Run every working order through its security's fill models,
    /// enqueueing any resulting fill events. Model failures are logged and
    /// skipped: one bad data point must not abort a multi-year run.
    pub fn scan_for_fills(
        &mut self,
        securities: &Securities,
        portfolio: &Portfolio,
        now: DateTime<Utc>,
    ) {
        let mut open_ids: Vec<OrderId> = self
            .records
            .iter()
            .filter(|(_, r)| r.order.is_open())
            .map(|(&id, _)| id)
            .collect();
        open_ids.sort();

        for id in open_ids {
            let record = match self.records.get_mut(&id) {
                Some(r) => r,
                None => continue,
            };
            let order = record.order.clone();
            let security = match securities.get(&order.symbol) {
                Some(s) => s,
                None => continue,
            };

            let slippage = security.models.slippage.slippage(security, &order);
            let remaining = order.remaining_quantity();
            let fill = match security.models.fill.fill(security, &order, remaining, slippage) {
                Ok(Some(fill)) => fill,
                Ok(None) => continue,
                Err(err) => {
                    warn!(order_id = %id, %err, "fill model failed; order stays working");
                    continue;
                }
            };

            let conversion = portfolio
                .cash_book
                .conversion_rate(&security.properties.quote_currency);
            let fee = if record.emitted_fee {
                0.0
            } else {
                record.emitted_fee = true;
                security.models.fee.fee(security, &order, conversion).max(0.0)
            };

            let status = if fill.quantity == remaining {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            let event = OrderEvent::fill(
                id,
                order.symbol.clone(),
                status,
                fill.price,
                fill.quantity,
                fee,
                now,
            );
            self.queue.push_back(event);
        }
    }

    /// Cancel day orders at a day boundary and good-til-date orders past
    /// their expiry.
    pub fn expire_orders(&mut self, now: DateTime<Utc>, day_boundary: bool) {
        let expired: Vec<OrderId> = self
            .records
            .values()
            .filter(|r| r.order.is_open())
            .filter(|r| match r.order.time_in_force {
                TimeInForce::Day => day_boundary,
                TimeInForce::GoodTilDate(expiry) => now > expiry,
                TimeInForce::GoodTilCanceled => false,
            })
            .map(|r| r.order.id)
            .collect();
        for id in expired {
            let _ = self.cancel_order(id, "expired", now);
        }
    }

    /// Rewrite open raw-mode orders for a split: prices and quantities scale
    /// by the split factor so working stops/limits stay meaningful.
    pub fn adjust_open_orders_for_split(&mut self, split: &Split) {
        let factor = split.split_factor;
        for record in self.records.values_mut() {
            let order = &mut record.order;
            if !order.is_open() || order.symbol != split.symbol {
                continue;
            }
            order.order_type = match order.order_type {
                OrderType::Limit { limit_price } => OrderType::Limit {
                    limit_price: limit_price * factor,
                },
                OrderType::StopMarket { stop_price } => OrderType::StopMarket {
                    stop_price: stop_price * factor,
                },
                OrderType::StopLimit {
                    stop_price,
                    limit_price,
                } => OrderType::StopLimit {
                    stop_price: stop_price * factor,
                    limit_price: limit_price * factor,
                },
                other => other,
            };
            let scale = |q: i64| {
                let scaled = (q as f64 * factor).trunc() as i64;
                if q != 0 && scaled == 0 {
                    q.signum()
                } else {
                    scaled
                }
            };
            order.quantity = scale(order.quantity);
            order.filled_quantity = scale(order.filled_quantity);
        }
    }

    // ── Synchronous drain ──────────────────────────────────────────────

    /// Drain all pending order events — model fills queued here plus
    /// anything external threads pushed through the event sender — applying
    /// each to the order table and the portfolio in FIFO order.
    ///
    /// Returns the applied events for forwarding to the strategy's
    /// order-event callback. Calling again with no new events is a no-op.
    pub fn drain_events(
        &mut self,
        securities: &Securities,
        portfolio: &mut Portfolio,
    ) -> Vec<OrderEvent> {
        while let Ok(event) = self.external_rx.try_recv() {
            self.queue.push_back(event);
        }

        let mut applied = Vec::new();
        while let Some(event) = self.queue.pop_front() {
            let record = match self.records.get_mut(&event.order_id) {
                Some(r) => r,
                None => {
                    warn!(order_id = %event.order_id, "event for unknown order id dropped");
                    continue;
                }
            };

            if event.is_fill() {
                // Reconciliation guard: a fill seen by both a push
                // notification and a polling sweep must apply once.
                if record.reconcile == ReconcileState::Closed {
                    warn!(order_id = %event.order_id, "duplicate fill for closed order dropped");
                    continue;
                }
                let new_filled = record.order.filled_quantity + event.fill_quantity;
                if new_filled.abs() > record.order.quantity.abs()
                    || event.fill_quantity.signum() != record.order.quantity.signum()
                {
                    warn!(order_id = %event.order_id, "overfilling event dropped");
                    continue;
                }
                if let Err(err) = record.order.set_status(event.status) {
                    warn!(%err, "fill event with regressing status dropped");
                    continue;
                }
                record.order.filled_quantity = new_filled;
                record.reconcile = if record.order.status.is_terminal() {
                    ReconcileState::Closed
                } else {
                    ReconcileState::PartiallyFilled
                };

                match securities.get(&event.symbol) {
                    Some(security) => portfolio.process_fill(security, &event),
                    None => warn!(symbol = %event.symbol, "fill for unknown security"),
                }
            } else if record.order.set_status(event.status).is_err() {
                // Stale status transition (e.g. a late Submitted echo after
                // a fill). Drop it; the order table already moved on.
                continue;
            } else if record.order.status.is_terminal() {
                record.reconcile = ReconcileState::Closed;
            }

            applied.push(event);
        }
        applied
    }
}
