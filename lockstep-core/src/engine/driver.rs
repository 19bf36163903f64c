//! The event/simulation loop.
//!
//! One thread pulls time-ordered slices from the feed and drives everything
//! else: the clock, security and cash updates, scheduled events, the fill
//! pipeline, corporate actions, margin and settlement scans, and the
//! strategy callbacks — in the fixed order accounting correctness depends
//! on. Strategy failures and panics are trapped here and become the run's
//! single fatal error; they never unwind through the host.

use super::algorithm::{Algorithm, AlgorithmConfig, AlgorithmError, CallbackSet};
use super::context::{AlgorithmContext, EngineMode};
use super::schedule::Schedule;
use super::status::{AlgorithmStatus, StatusUpdate, StopReason};
use crate::brokerage::{Brokerage, BrokerageMessage, MessageSeverity};
use crate::domain::{
    DelistingKind, OrderId, Securities, Security, Symbol, TimeSlice,
};
use crate::feed::{HistoryProvider, SliceFeed};
use crate::portfolio::Portfolio;
use crate::settings::EngineSettings;
use crate::time::{TimeError, TimeKeeper};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// A condition that terminates the run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("strategy callback {callback} failed: {message}")]
    Strategy {
        callback: &'static str,
        message: String,
    },
    #[error(transparent)]
    Time(#[from] TimeError),
    /// The wall-clock watchdog fired: a stuck algorithm, not a recoverable
    /// condition.
    #[error("slice processing exceeded the {limit_secs}s wall-clock ceiling")]
    Timeout { limit_secs: u64 },
    #[error("brokerage failure: {0}")]
    Brokerage(String),
}

/// Equity (and optional benchmark) sampled at a day boundary, before the new
/// day's prices apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub date: NaiveDate,
    pub equity: f64,
    pub benchmark: Option<f64>,
}

/// Operator-side handle for stopping a running engine. Checked once per
/// slice.
#[derive(Clone, Default)]
pub struct ControlHandle {
    request: Arc<Mutex<Option<StopReason>>>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.request(StopReason::Stop);
    }

    /// Close all positions, then stop (live mode).
    pub fn request_liquidation(&self) {
        self.request(StopReason::Liquidate);
    }

    pub fn request_deletion(&self) {
        self.request(StopReason::Delete);
    }

    fn request(&self, reason: StopReason) {
        if let Ok(mut slot) = self.request.lock() {
            *slot = Some(reason);
        }
    }

    fn take(&self) -> Option<StopReason> {
        self.request.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Everything a finished run leaves behind.
pub struct RunSummary<A> {
    pub status: AlgorithmStatus,
    pub error: Option<FatalError>,
    pub slices_processed: usize,
    pub equity_samples: Vec<EquitySample>,
    /// Final run state: portfolio, orders, securities, clock.
    pub context: AlgorithmContext,
    /// The strategy, returned so callers can inspect its final state.
    pub algorithm: A,
}

impl<A> RunSummary<A> {
    pub fn final_equity(&self) -> f64 {
        self.context.total_portfolio_value()
    }
}

/// Liquidation tracking for a delisted security.
struct DelistFollowUp {
    ticket: Option<OrderId>,
}

/// The engine: a configured algorithm plus the loop state that drives it.
pub struct Engine<A: Algorithm> {
    algorithm: A,
    ctx: AlgorithmContext,
    callbacks: CallbackSet,
    schedule: Schedule,
    warmup_period: Option<Duration>,
    benchmark: Option<Symbol>,
    feed: Box<dyn SliceFeed>,
    history: Option<Box<dyn HistoryProvider>>,
    settings: EngineSettings,
    mode: EngineMode,
    control: ControlHandle,
    status_tx: Option<Sender<StatusUpdate>>,
    brokerage_rx: Option<Receiver<BrokerageMessage>>,
    status: AlgorithmStatus,
    disconnected: bool,
    current_date: Option<NaiveDate>,
    last_warmup_time: Option<DateTime<Utc>>,
    last_margin_scan: Option<DateTime<Utc>>,
    last_settlement_scan: Option<DateTime<Utc>>,
    margin_warning_latch: bool,
    pending_delistings: HashMap<Symbol, DelistFollowUp>,
    equity_samples: Vec<EquitySample>,
    slices_processed: usize,
}

impl<A: Algorithm> Engine<A> {
    /// Two-phase construction: run `initialize`, freeze the configuration,
    /// and build the running state. After this returns there is no way to
    /// change subscriptions, callbacks, warm-up, or schedules.
    pub fn start(
        mut algorithm: A,
        settings: EngineSettings,
        feed: Box<dyn SliceFeed>,
        mode: EngineMode,
    ) -> Result<Self, FatalError> {
        let mut config = AlgorithmConfig::new();
        let init = catch_unwind(AssertUnwindSafe(|| algorithm.initialize(&mut config)));
        match init {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(FatalError::Strategy {
                    callback: "initialize",
                    message: err.to_string(),
                })
            }
            Err(payload) => {
                return Err(FatalError::Strategy {
                    callback: "initialize",
                    message: panic_message(payload.as_ref()),
                })
            }
        }

        let clock = match mode {
            EngineMode::Backtest => TimeKeeper::backtest(DateTime::<Utc>::MIN_UTC),
            EngineMode::Live => TimeKeeper::live(DateTime::<Utc>::MIN_UTC),
        };
        let portfolio = Portfolio::new(settings.account_currency.clone(), settings.initial_cash);
        let mut ctx = AlgorithmContext::new(clock, Securities::new(), portfolio, mode);

        for seed in config.securities.drain(..) {
            if ctx.securities.contains(&seed.symbol) {
                continue;
            }
            ctx.time
                .add_exchange(seed.exchange.name.clone(), seed.exchange.offset());
            ctx.securities.add(Security::from_seed(seed));
        }

        Ok(Self {
            algorithm,
            ctx,
            callbacks: config.callbacks,
            schedule: Schedule::new(config.scheduled),
            warmup_period: config.warmup,
            benchmark: config.benchmark,
            feed,
            history: None,
            settings,
            mode,
            control: ControlHandle::new(),
            status_tx: None,
            brokerage_rx: None,
            status: AlgorithmStatus::Running,
            disconnected: false,
            current_date: None,
            last_warmup_time: None,
            last_margin_scan: None,
            last_settlement_scan: None,
            margin_warning_latch: false,
            pending_delistings: HashMap::new(),
            equity_samples: Vec::new(),
            slices_processed: 0,
        })
    }

    pub fn with_history(mut self, history: Box<dyn HistoryProvider>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_brokerage(mut self, brokerage: Box<dyn Brokerage>) -> Self {
        self.ctx.brokerage = Some(brokerage);
        self
    }

    pub fn with_status_channel(mut self, tx: Sender<StatusUpdate>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn with_brokerage_messages(mut self, rx: Receiver<BrokerageMessage>) -> Self {
        self.brokerage_rx = Some(rx);
        self
    }

    /// Use an externally created control handle (so other components can
    /// hold a clone before the engine starts).
    pub fn with_control(mut self, control: ControlHandle) -> Self {
        self.control = control;
        self
    }

    /// Handle for stopping the run from another thread.
    pub fn control_handle(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Sender for external threads (live brokerage adapters, pollers) to
    /// report order events. Events land in the synchronous queue and apply
    /// at the next drain point.
    pub fn order_event_sender(&self) -> Sender<crate::domain::OrderEvent> {
        self.ctx.transactions.event_sender()
    }

    // ── The loop ───────────────────────────────────────────────────────

    pub fn run(mut self) -> RunSummary<A> {
        let mut fatal: Option<FatalError> = None;
        let mut pending_first_slice: Option<TimeSlice> = None;

        // Warm-up sub-protocol: replay history to prime state before the
        // run proper. Orders are rejected for its duration.
        if let Some(period) = self.warmup_period {
            self.set_status(AlgorithmStatus::WarmingUp, None);
            self.ctx.warming_up = true;

            let end = match self.mode {
                EngineMode::Backtest => match self.feed.next_slice() {
                    Some(first) => {
                        let t = first.time;
                        pending_first_slice = Some(first);
                        Some(t)
                    }
                    None => None,
                },
                EngineMode::Live => Some(Utc::now()),
            };

            if let (Some(end), Some(history)) = (end, self.history.as_mut()) {
                let replay = history.history(end - period, end);
                info!(slices = replay.len(), "warm-up replay starting");
                for slice in replay {
                    self.last_warmup_time = Some(slice.time);
                    if let Err(err) = self.process_slice(slice) {
                        fatal = Some(err);
                        break;
                    }
                }
            } else if end.is_some() {
                warn!("warm-up configured but no history provider; skipping");
            }

            self.ctx.warming_up = false;

            // Live handover check: replay should end within one resolution
            // step of the wall clock, or the stream starts with a gap.
            if self.mode == EngineMode::Live {
                if let Some(last) = self.last_warmup_time {
                    let gap = Utc::now() - last;
                    let resolution =
                        Duration::seconds(self.settings.minimum_resolution_seconds as i64);
                    if gap > resolution {
                        warn!(
                            gap_secs = gap.num_seconds(),
                            "warm-up replay ended behind wall clock; live data will bridge the gap"
                        );
                    }
                }
            }
        }

        if fatal.is_none() {
            self.set_status(AlgorithmStatus::Running, None);
        }

        while fatal.is_none() {
            // Operator cancellation, checked once per slice.
            if let Some(reason) = self.control.take() {
                match reason {
                    StopReason::Stop => self.set_status(AlgorithmStatus::Stopped, None),
                    StopReason::Delete => self.set_status(AlgorithmStatus::Deleted, None),
                    StopReason::Liquidate => {
                        if let Err(err) = self.liquidate_everything() {
                            fatal = Some(err);
                        }
                        self.set_status(AlgorithmStatus::Liquidated, None);
                    }
                }
                break;
            }

            let slice = match pending_first_slice.take().or_else(|| self.feed.next_slice()) {
                Some(slice) => slice,
                None => {
                    self.set_status(AlgorithmStatus::Completed, None);
                    break;
                }
            };

            // Live handover: data replayed during warm-up must not be
            // delivered a second time by the streaming feed.
            if let Some(last) = self.last_warmup_time {
                if slice.time <= last {
                    continue;
                }
            }

            let started = Instant::now();
            if let Err(err) = self.process_slice(slice) {
                fatal = Some(err);
                break;
            }
            let limit_secs = self.settings.slice_timeout_seconds;
            if started.elapsed().as_secs() >= limit_secs && limit_secs > 0 {
                fatal = Some(FatalError::Timeout { limit_secs });
                break;
            }
            self.slices_processed += 1;
        }

        // Final drain: no fill produced before the end of the run may be
        // lost, whatever state we ended in.
        if let Err(err) = self.forward_order_events() {
            if fatal.is_none() {
                fatal = Some(err);
            }
        }

        if let Some(err) = &fatal {
            self.set_status(AlgorithmStatus::RuntimeError, Some(err.to_string()));
        }

        if let Err(err) = self.guard("on_end_of_algorithm", |a, ctx| a.on_end_of_algorithm(ctx)) {
            warn!(%err, "on_end_of_algorithm failed after run end");
        }

        RunSummary {
            status: self.status,
            error: fatal,
            slices_processed: self.slices_processed,
            equity_samples: self.equity_samples,
            context: self.ctx,
            algorithm: self.algorithm,
        }
    }

    // ── Per-slice procedure ────────────────────────────────────────────

    fn process_slice(&mut self, slice: TimeSlice) -> Result<(), FatalError> {
        self.handle_brokerage_messages()?;

        // 1. Advance the clock. Out-of-order slices are fatal.
        self.ctx.time.set_utc(slice.time)?;

        // 2. Day boundary: sample equity and benchmark BEFORE the new
        //    slice's prices apply, so the sample cannot see ahead.
        let slice_date = slice.time.date_naive();
        let day_boundary = match self.current_date {
            Some(prev) => slice_date > prev,
            None => false,
        };
        if day_boundary {
            let prev = self.current_date.expect("day_boundary implies a previous date");
            self.sample_equity(prev);
            self.ctx.transactions.expire_orders(slice.time, true);
            if self.callbacks.on_end_of_day {
                self.guard("on_end_of_day", |a, ctx| a.on_end_of_day(prev, ctx))?;
            }
        } else {
            self.ctx.transactions.expire_orders(slice.time, false);
        }
        self.current_date = Some(slice_date);

        // 3. Universe changes.
        let changes = slice.security_changes.clone();
        for seed in &changes.added {
            if self.ctx.securities.contains(&seed.symbol) {
                continue;
            }
            self.ctx
                .time
                .add_exchange(seed.exchange.name.clone(), seed.exchange.offset());
            self.ctx.securities.add(Security::from_seed(seed.clone()));
        }
        for symbol in &changes.removed {
            let flat = self.ctx.portfolio.holding(symbol).is_flat();
            let no_orders = !self.ctx.transactions.has_open_orders_for(symbol);
            if flat && no_orders {
                self.ctx.securities.remove(symbol);
            } else {
                warn!(%symbol, "universe removal deferred: position or orders still open");
            }
        }

        // 4. Security prices and conversion rates.
        for (symbol, bar) in &slice.bars {
            if let Some(security) = self.ctx.securities.get_mut(symbol) {
                security.update_bar(*bar);
            }
        }
        for (symbol, quote) in &slice.quotes {
            if let Some(security) = self.ctx.securities.get_mut(symbol) {
                security.update_quote(*quote);
            }
        }
        for (currency, rate) in &slice.conversion_rates {
            self.ctx
                .portfolio
                .cash_book
                .update_conversion_rate(currency, *rate);
        }

        // 5. Scheduled events.
        for name in self.schedule.due(slice.time) {
            self.guard("on_scheduled_event", |a, ctx| {
                a.on_scheduled_event(&name, ctx)
            })?;
        }

        // 6. Drain synchronous fills.
        self.forward_order_events()?;

        // 7. Delisting liquidation follow-ups from earlier slices.
        self.process_delisting_follow_ups();

        // 8. Periodic scans (simulated-time cadence).
        if !self.ctx.warming_up {
            self.run_margin_scan_if_due(slice.time)?;
            self.run_settlement_scan_if_due(slice.time);
        }

        // 9. Strategy notifications, in the fixed order: universe changes,
        //    dividends, splits, delistings, bars, unified data. Split and
        //    dividend application — including open-order price adjustment —
        //    completes before delistings are handled.
        if !changes.is_empty() && self.callbacks.on_securities_changed {
            self.guard("on_securities_changed", |a, ctx| {
                a.on_securities_changed(&changes, ctx)
            })?;
        }

        for dividend in &slice.dividends {
            apply_dividend(&mut self.ctx, dividend);
            if self.callbacks.on_dividends {
                self.guard("on_dividend", |a, ctx| a.on_dividend(dividend, ctx))?;
            }
        }

        for split in &slice.splits {
            apply_split(&mut self.ctx, split);
            if self.callbacks.on_splits {
                self.guard("on_split", |a, ctx| a.on_split(split, ctx))?;
            }
        }

        for delisting in &slice.delistings {
            match delisting.kind {
                DelistingKind::Warning => {
                    if let Some(security) = self.ctx.securities.get_mut(&delisting.symbol) {
                        security.delist_warned = true;
                    }
                }
                DelistingKind::Delisted => {
                    if let Some(security) = self.ctx.securities.get_mut(&delisting.symbol) {
                        security.delisted = true;
                    }
                    let ticket = self
                        .ctx
                        .liquidate(&delisting.symbol, "delisted")
                        .map(|t| t.order_id);
                    self.pending_delistings
                        .insert(delisting.symbol.clone(), DelistFollowUp { ticket });
                }
            }
            if self.callbacks.on_delistings {
                self.guard("on_delisting", |a, ctx| a.on_delisting(delisting, ctx))?;
            }
        }

        if self.callbacks.on_bars && !slice.bars.is_empty() {
            let bars = slice.bars.clone();
            self.guard("on_bars", |a, ctx| a.on_bars(&bars, ctx))?;
        }
        if self.callbacks.on_data {
            self.guard("on_data", |a, ctx| a.on_data(&slice, ctx))?;
        }

        // 10. Drain synchronous fills once more so same-slice orders
        //     resolve before the next slice.
        self.forward_order_events()?;

        Ok(())
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn forward_order_events(&mut self) -> Result<(), FatalError> {
        let events = self.ctx.scan_and_drain();
        for event in events {
            self.guard("on_order_event", |a, ctx| a.on_order_event(&event, ctx))?;
        }
        Ok(())
    }

    fn process_delisting_follow_ups(&mut self) {
        let symbols: Vec<Symbol> = self.pending_delistings.keys().cloned().collect();
        for symbol in symbols {
            let order_done = match self.pending_delistings[&symbol].ticket {
                Some(id) => self
                    .ctx
                    .transactions
                    .order(id)
                    .map_or(true, |o| o.status.is_terminal()),
                None => true,
            };
            if !order_done {
                continue;
            }
            let holding = self.ctx.portfolio.holding(&symbol);
            if holding.is_flat() {
                self.ctx.securities.remove(&symbol);
                self.pending_delistings.remove(&symbol);
            } else {
                // Liquidation ended without flattening (e.g. partial fill
                // then cancel): issue a fresh one.
                let ticket = self.ctx.liquidate(&symbol, "delisted").map(|t| t.order_id);
                if let Some(entry) = self.pending_delistings.get_mut(&symbol) {
                    entry.ticket = ticket;
                }
            }
        }
    }

    fn run_margin_scan_if_due(&mut self, now: DateTime<Utc>) -> Result<(), FatalError> {
        let interval = Duration::minutes(self.settings.margin_scan_minutes as i64);
        let due = self
            .last_margin_scan
            .map_or(true, |last| now - last >= interval);
        if !due {
            return Ok(());
        }
        self.last_margin_scan = Some(now);

        let scan = self.ctx.portfolio.scan_for_margin_call(&self.ctx.securities);
        if scan.warning {
            if !self.margin_warning_latch {
                self.margin_warning_latch = true;
                self.guard("on_margin_call_warning", |a, ctx| {
                    a.on_margin_call_warning(ctx)
                })?;
            }
        } else {
            self.margin_warning_latch = false;
        }

        if !scan.orders.is_empty() {
            let mut requests = scan.orders;
            warn!(count = requests.len(), "margin call: issuing liquidation orders");
            self.guard("on_margin_call", |a, ctx| a.on_margin_call(&mut requests, ctx))?;
            for request in requests {
                self.ctx.submit_unchecked(request);
            }
            // Apply the liquidations within this slice.
            self.forward_order_events()?;
        }
        Ok(())
    }

    fn run_settlement_scan_if_due(&mut self, now: DateTime<Utc>) {
        let interval = Duration::minutes(self.settings.settlement_scan_minutes as i64);
        let due = self
            .last_settlement_scan
            .map_or(true, |last| now - last >= interval);
        if !due {
            return;
        }
        self.last_settlement_scan = Some(now);
        let settled = self.ctx.portfolio.settle_due_funds(now);
        if settled > 0 {
            info!(settled, "settled due funds");
        }
    }

    fn sample_equity(&mut self, date: NaiveDate) {
        let equity = self.ctx.portfolio.total_portfolio_value(&self.ctx.securities);
        let benchmark = self
            .benchmark
            .as_ref()
            .and_then(|symbol| self.ctx.securities.get(symbol))
            .map(|security| security.price());
        self.equity_samples.push(EquitySample {
            date,
            equity,
            benchmark,
        });
    }

    fn liquidate_everything(&mut self) -> Result<(), FatalError> {
        let open_ids: Vec<OrderId> = self
            .ctx
            .transactions
            .open_orders()
            .iter()
            .map(|o| o.id)
            .collect();
        for id in open_ids {
            let _ = self.ctx.cancel_order(id, "terminal liquidation");
        }
        let symbols = self.ctx.securities.symbols();
        for symbol in symbols {
            self.ctx.liquidate(&symbol, "terminal liquidation");
        }
        self.forward_order_events()
    }

    fn handle_brokerage_messages(&mut self) -> Result<(), FatalError> {
        let messages: Vec<BrokerageMessage> = match &self.brokerage_rx {
            Some(rx) => rx.try_iter().collect(),
            None => return Ok(()),
        };
        for message in messages {
            match message.severity {
                MessageSeverity::Information => info!(text = %message.text, "brokerage"),
                MessageSeverity::Warning => warn!(text = %message.text, "brokerage"),
                MessageSeverity::Reconnect => {
                    self.disconnected = false;
                    info!(text = %message.text, "brokerage reconnected");
                }
                MessageSeverity::Disconnect => {
                    self.disconnected = true;
                    warn!(text = %message.text, "brokerage disconnected");
                }
                MessageSeverity::Error => {
                    return Err(FatalError::Brokerage(message.text));
                }
            }
        }
        // A disconnect is tolerable while every market is closed; once any
        // subscribed exchange is open and we are still down, it is fatal.
        if self.disconnected && self.any_market_open() {
            return Err(FatalError::Brokerage(
                "disconnected while exchanges are open".into(),
            ));
        }
        Ok(())
    }

    fn any_market_open(&self) -> bool {
        use chrono::Datelike;
        self.ctx.securities.iter().any(|(_, security)| {
            let local = self.ctx.time.local_time(&security.exchange.name);
            security
                .exchange
                .hours
                .is_open(local.weekday(), local.time())
        })
    }

    fn set_status(&mut self, status: AlgorithmStatus, message: Option<String>) {
        if self.status == status {
            return;
        }
        self.status = status;
        if let Some(tx) = &self.status_tx {
            let update = match message {
                Some(message) => StatusUpdate::with_message(status, message),
                None => StatusUpdate::new(status),
            };
            let _ = tx.send(update);
        }
    }

    fn guard<F>(&mut self, callback: &'static str, f: F) -> Result<(), FatalError>
    where
        F: FnOnce(&mut A, &mut AlgorithmContext) -> Result<(), AlgorithmError>,
    {
        let Self { algorithm, ctx, .. } = self;
        match catch_unwind(AssertUnwindSafe(|| f(algorithm, ctx))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(FatalError::Strategy {
                callback,
                message: err.to_string(),
            }),
            Err(payload) => Err(FatalError::Strategy {
                callback,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

/// Apply a dividend through disjoint borrows of the context's fields.
fn apply_dividend(ctx: &mut AlgorithmContext, dividend: &crate::domain::Dividend) {
    if let Some(security) = ctx.securities.get(&dividend.symbol) {
        ctx.portfolio.apply_dividend(security, dividend);
    }
}

/// Apply a split: holdings and cached prices first, then open-order price
/// adjustment, so everything is consistent before delistings are handled.
fn apply_split(ctx: &mut AlgorithmContext, split: &crate::domain::Split) {
    if let Some(security) = ctx.securities.get_mut(&split.symbol) {
        ctx.portfolio.apply_split(security, split);
        if security.normalization == crate::domain::DataNormalizationMode::Raw {
            ctx.transactions.adjust_open_orders_for_split(split);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "strategy panicked".to_string()
    }
}
