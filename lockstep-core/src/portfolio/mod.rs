//! Portfolio accounting: holdings, cash, margin, and corporate actions.
//!
//! All holding mutation flows through [`Portfolio::process_fill`]; strategy
//! code only ever reads this state. The fill algorithm is order-sensitive:
//! traded volume, then fees, then settlement of the notional, then realized
//! profit on the closed quantity, then the quantity/average-price update
//! with its crossing reset.

use crate::domain::{
    CashBook, Dividend, Holding, OrderEvent, OrderRequest, Securities, Security, Split, Symbol,
    TradeRecord, UnsettledFunds,
};
use crate::domain::security::DataNormalizationMode;
use crate::models::SettlementTerms;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Result of a margin-call scan.
#[derive(Debug, Default)]
pub struct MarginCallScan {
    /// Liquidating orders; empty unless margin remaining is negative.
    pub orders: Vec<OrderRequest>,
    /// Margin remaining has dropped to <= 5% of portfolio value.
    pub warning: bool,
}

/// Aggregate account state: multi-currency cash, per-security holdings, and
/// the realized-trade ledger.
pub struct Portfolio {
    pub cash_book: CashBook,
    pub holdings: HashMap<Symbol, Holding>,
    /// Proceeds awaiting settlement, drained by the settlement scan.
    unsettled: Vec<UnsettledFunds>,
    /// Realized-profit records keyed by close time; colliding timestamps are
    /// bumped by 1 ms so no record is lost.
    trade_records: BTreeMap<DateTime<Utc>, TradeRecord>,
}

impl Portfolio {
    pub fn new(account_currency: impl Into<String>, initial_cash: f64) -> Self {
        Self {
            cash_book: CashBook::new(account_currency, initial_cash),
            holdings: HashMap::new(),
            unsettled: Vec::new(),
            trade_records: BTreeMap::new(),
        }
    }

    pub fn holding(&self, symbol: &Symbol) -> Holding {
        self.holdings.get(symbol).cloned().unwrap_or_default()
    }

    pub fn trade_records(&self) -> &BTreeMap<DateTime<Utc>, TradeRecord> {
        &self.trade_records
    }

    pub fn unsettled_funds(&self) -> &[UnsettledFunds] {
        &self.unsettled
    }

    fn conversion_rate(&self, security: &Security) -> f64 {
        self.cash_book
            .conversion_rate(&security.properties.quote_currency)
    }

    // ── Fill accounting ────────────────────────────────────────────────

    /// Apply one fill event to cash and holdings.
    ///
    /// Non-fill events (pure status transitions) are ignored.
    pub fn process_fill(&mut self, security: &Security, event: &OrderEvent) {
        if !event.is_fill() {
            return;
        }

        let multiplier = security.properties.contract_multiplier;
        let conversion = self.conversion_rate(security);
        let quote_currency = security.properties.quote_currency.clone();
        let fill_qty = event.fill_quantity;
        let fill_price = event.fill_price;

        let (old_qty, old_avg) = {
            let holding = self.holdings.entry(event.symbol.clone()).or_default();

            // 1. Traded volume in account currency.
            let sale_value = fill_price * fill_qty.abs() as f64 * multiplier * conversion;
            holding.total_sale_volume += sale_value;

            // 2. Fee, already in account currency.
            holding.total_fees += event.fee;

            (holding.quantity, holding.average_price)
        };

        // 4. Realized profit on the closed quantity, matched against the
        //    average price (not individual lots).
        let closes = old_qty != 0 && (old_qty > 0) != (fill_qty > 0);
        if closes {
            let closed_qty = fill_qty.abs().min(old_qty.abs());
            let per_unit = if old_qty > 0 {
                fill_price - old_avg
            } else {
                old_avg - fill_price
            };
            let profit = per_unit * closed_qty as f64 * multiplier * conversion;
            if let Some(holding) = self.holdings.get_mut(&event.symbol) {
                holding.realized_profit += profit;
            }

            let record = TradeRecord {
                symbol: event.symbol.clone(),
                order_id: event.order_id,
                closed_quantity: closed_qty,
                close_price: fill_price,
                entry_price: old_avg,
                profit,
                time: event.timestamp,
            };
            self.insert_trade_record(record);
        }

        // 5. Quantity and average price, with the crossing reset: average
        //    price has no meaning across a sign change, so it is reseeded at
        //    the new side's entry price, never blended across zero.
        let holding = self.holdings.entry(event.symbol.clone()).or_default();
        let new_qty = old_qty + fill_qty;
        if old_qty == 0 {
            holding.average_price = fill_price;
        } else if (old_qty > 0) == (fill_qty > 0) {
            // Same direction: weighted-average re-price.
            holding.average_price = (holding.average_price * old_qty as f64
                + fill_price * fill_qty as f64)
                / new_qty as f64;
        } else if new_qty == 0 {
            holding.average_price = 0.0;
        } else if (new_qty > 0) != (old_qty > 0) {
            // Crossed zero: the remainder is a fresh position at the fill price.
            holding.average_price = fill_price;
        }
        holding.quantity = new_qty;

        // 2b/3. Cash: fee from account cash, then the notional delta in the
        // security's quote currency through the settlement model.
        let account_currency = self.cash_book.account_currency().to_string();
        self.cash_book.add(&account_currency, -event.fee);

        let notional = -(fill_qty as f64) * fill_price * multiplier;
        match security.models.settlement.settle(event.timestamp, notional) {
            SettlementTerms::Immediate => self.cash_book.add(&quote_currency, notional),
            SettlementTerms::Delayed { available_at } => self.unsettled.push(UnsettledFunds {
                currency: quote_currency,
                amount: notional,
                available_at,
            }),
        }
    }

    fn insert_trade_record(&mut self, record: TradeRecord) {
        let mut time = record.time;
        while self.trade_records.contains_key(&time) {
            time += Duration::milliseconds(1);
        }
        let mut record = record;
        record.time = time;
        self.trade_records.insert(time, record);
    }

    // ── Corporate actions ──────────────────────────────────────────────

    /// Credit a cash dividend: `quantity * distribution`, converted to
    /// account currency. Only applies in price-normalization modes that do
    /// not already bake distributions into the price series.
    pub fn apply_dividend(&mut self, security: &Security, dividend: &Dividend) {
        match security.normalization {
            DataNormalizationMode::Raw | DataNormalizationMode::SplitAdjusted => {}
            _ => return,
        }
        let holding = self.holding(&dividend.symbol);
        if holding.is_flat() {
            return;
        }
        let conversion = self.conversion_rate(security);
        let amount = holding.quantity as f64 * dividend.distribution * conversion;
        let account_currency = self.cash_book.account_currency().to_string();
        self.cash_book.add(&account_currency, amount);
    }

    /// Apply a split to the holding and rewrite the security's cached data
    /// point, so valuation is consistent before the next price arrives.
    /// Raw-price mode only; other modes carry splits in the price series.
    ///
    /// `split_factor` is the price-scale factor (0.5 for 2-for-1): quantity
    /// scales by the factor and truncates, average price multiplies by the
    /// factor, and the truncated remainder (in pre-split shares) is cashed
    /// out at the reference price.
    pub fn apply_split(&mut self, security: &mut Security, split: &Split) {
        if security.normalization != DataNormalizationMode::Raw {
            return;
        }
        let factor = split.split_factor;
        if factor <= 0.0 || !factor.is_finite() {
            warn!(symbol = %split.symbol, factor, "ignoring split with non-positive factor");
            return;
        }

        let holding = self.holdings.entry(split.symbol.clone()).or_default();
        if !holding.is_flat() {
            let scaled = holding.quantity as f64 * factor;
            let new_qty = scaled.trunc() as i64;
            let leftover_pre_split = (scaled - new_qty as f64) / factor;

            holding.quantity = new_qty;
            holding.average_price *= factor;
            if holding.quantity == 0 {
                holding.average_price = 0.0;
            }

            if leftover_pre_split != 0.0 {
                let quote_currency = security.properties.quote_currency.clone();
                self.cash_book
                    .add(&quote_currency, leftover_pre_split * split.reference_price);
            }
        }

        security.scale_cached_prices(factor);
    }

    // ── Valuation & margin ─────────────────────────────────────────────

    /// Signed value of all holdings, in account currency.
    pub fn total_holdings_value(&self, securities: &Securities) -> f64 {
        self.holdings_value_by(securities, Holding::market_value)
    }

    /// Absolute exposure of all holdings, in account currency.
    pub fn total_absolute_holdings_value(&self, securities: &Securities) -> f64 {
        self.holdings_value_by(securities, Holding::absolute_value)
    }

    fn holdings_value_by(
        &self,
        securities: &Securities,
        value: fn(&Holding, f64, f64, f64) -> f64,
    ) -> f64 {
        self.holdings
            .iter()
            .filter(|(_, h)| !h.is_flat())
            .filter_map(|(symbol, holding)| {
                let security = securities.get(symbol)?;
                Some(value(
                    holding,
                    security.price(),
                    security.properties.contract_multiplier,
                    self.conversion_rate(security),
                ))
            })
            .sum()
    }

    fn unsettled_value(&self) -> f64 {
        self.unsettled
            .iter()
            .map(|u| u.amount * self.cash_book.conversion_rate(&u.currency))
            .sum()
    }

    /// Equity: settled cash + unsettled proceeds + holdings value.
    pub fn total_portfolio_value(&self, securities: &Securities) -> f64 {
        self.cash_book.total_value() + self.unsettled_value() + self.total_holdings_value(securities)
    }

    /// Sum of maintenance margin across holdings, in account currency.
    pub fn total_margin_used(&self, securities: &Securities) -> f64 {
        self.holdings
            .iter()
            .filter(|(_, h)| !h.is_flat())
            .filter_map(|(symbol, holding)| {
                let security = securities.get(symbol)?;
                Some(security.models.margin.maintenance_margin(
                    security,
                    holding,
                    self.conversion_rate(security),
                ))
            })
            .sum()
    }

    pub fn margin_remaining(&self, securities: &Securities) -> f64 {
        self.total_portfolio_value(securities) - self.total_margin_used(securities)
    }

    /// Scan for margin calls.
    ///
    /// Unmargined accounts never generate calls: the scan is empty unless
    /// margin is in use and the holdings' average leverage exceeds 1x. A
    /// warning fires once margin remaining falls to 5% of portfolio value;
    /// liquidating orders are generated only once it goes negative.
    pub fn scan_for_margin_call(&self, securities: &Securities) -> MarginCallScan {
        let mut scan = MarginCallScan::default();

        let margin_used = self.total_margin_used(securities);
        if margin_used <= 0.0 {
            return scan;
        }
        let portfolio_value = self.total_portfolio_value(securities);
        if portfolio_value <= 0.0 {
            return scan;
        }
        let average_leverage = self.total_absolute_holdings_value(securities) / portfolio_value;
        if average_leverage <= 1.0 {
            return scan;
        }

        let margin_remaining = portfolio_value - margin_used;
        if margin_remaining <= portfolio_value * 0.05 {
            scan.warning = true;
        }
        if margin_remaining >= 0.0 {
            return scan;
        }

        // Liquidate in deterministic symbol order until the deficit is
        // covered (or every holding has been asked).
        let mut deficit = -margin_remaining;
        let mut symbols: Vec<&Symbol> = self
            .holdings
            .iter()
            .filter(|(_, h)| !h.is_flat())
            .map(|(s, _)| s)
            .collect();
        symbols.sort_by(|a, b| a.ticker.cmp(&b.ticker));

        for symbol in symbols {
            if deficit <= 0.0 {
                break;
            }
            let security = match securities.get(symbol) {
                Some(s) => s,
                None => continue,
            };
            let holding = &self.holdings[symbol];
            let conversion = self.conversion_rate(security);
            if let Some(request) =
                security
                    .models
                    .margin
                    .margin_call_order(security, holding, conversion, deficit)
            {
                let freed = request.quantity.abs() as f64
                    * security.price()
                    * security.properties.contract_multiplier
                    * conversion
                    / security.models.margin.leverage();
                deficit -= freed;
                scan.orders.push(request);
            }
        }

        scan
    }

    // ── Settlement ─────────────────────────────────────────────────────

    /// Move due unsettled funds into the cash book. Returns the number of
    /// entries settled.
    pub fn settle_due_funds(&mut self, now: DateTime<Utc>) -> usize {
        let mut settled = 0;
        let mut remaining = Vec::with_capacity(self.unsettled.len());
        for entry in self.unsettled.drain(..) {
            if entry.available_at <= now {
                self.cash_book.add(&entry.currency, entry.amount);
                settled += 1;
            } else {
                remaining.push(entry);
            }
        }
        self.unsettled = remaining;
        settled
    }
}
