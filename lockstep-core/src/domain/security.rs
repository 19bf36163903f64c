//! Securities: per-instrument market state, reference data, and models.

use super::market::{Bar, Quote};
use super::symbol::{Symbol, SymbolProperties};
use crate::models::ModelSet;
use chrono::{FixedOffset, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How raw prices in the feed relate to corporate-action-adjusted prices.
///
/// Dividends are paid in cash only in `Raw` and `SplitAdjusted` modes; the
/// other modes bake distributions into the price series and would double
/// count. Splits change holdings only in `Raw` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataNormalizationMode {
    Raw,
    Adjusted,
    SplitAdjusted,
    TotalReturn,
}

/// Regular session hours, identical across weekdays. Closed on weekends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl MarketHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    /// 09:30–16:00, the US equity regular session.
    pub fn us_equity() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 30, 0).expect("static time"),
            close: NaiveTime::from_hms_opt(16, 0, 0).expect("static time"),
        }
    }

    pub fn is_open(&self, weekday: Weekday, time: NaiveTime) -> bool {
        if matches!(weekday, Weekday::Sat | Weekday::Sun) {
            return false;
        }
        time >= self.open && time < self.close
    }
}

/// An exchange: a named venue with a UTC offset and session hours.
///
/// The offset is stored in seconds; `FixedOffset` is derived on demand so the
/// type stays serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub name: String,
    pub utc_offset_secs: i32,
    pub hours: MarketHours,
}

impl Exchange {
    pub fn new(name: impl Into<String>, utc_offset_secs: i32, hours: MarketHours) -> Self {
        Self {
            name: name.into(),
            utc_offset_secs,
            hours,
        }
    }

    /// New York (UTC-5, standard time) with US equity hours.
    pub fn new_york() -> Self {
        Self::new("new-york", -5 * 3600, MarketHours::us_equity())
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).expect("offset within +/-24h")
    }
}

/// Construction-time description of a security: everything except the model
/// set, which is attached when the security is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySeed {
    pub symbol: Symbol,
    pub properties: SymbolProperties,
    pub exchange: Exchange,
    pub normalization: DataNormalizationMode,
}

impl SecuritySeed {
    pub fn us_equity(ticker: &str) -> Self {
        Self {
            symbol: Symbol::equity(ticker),
            properties: SymbolProperties::us_equity(),
            exchange: Exchange::new_york(),
            normalization: DataNormalizationMode::Raw,
        }
    }
}

/// A tradeable instrument: reference data, last market data, and the model
/// set that prices its executions.
///
/// Created when a strategy subscribes; price state is mutated on every data
/// point; removed from the active set only after a delisting liquidation
/// completes.
pub struct Security {
    pub symbol: Symbol,
    pub properties: SymbolProperties,
    pub exchange: Exchange,
    pub normalization: DataNormalizationMode,
    pub last_bar: Option<Bar>,
    pub last_quote: Option<Quote>,
    pub models: ModelSet,
    /// A delisting warning has been received; the instrument trades its last
    /// session.
    pub delist_warned: bool,
    /// The instrument is delisted; only liquidating orders may remain.
    pub delisted: bool,
}

impl Security {
    pub fn from_seed(seed: SecuritySeed) -> Self {
        Self {
            symbol: seed.symbol,
            properties: seed.properties,
            exchange: seed.exchange,
            normalization: seed.normalization,
            last_bar: None,
            last_quote: None,
            models: ModelSet::default_set(),
            delist_warned: false,
            delisted: false,
        }
    }

    /// Current price: last trade close, falling back to the quote mid.
    pub fn price(&self) -> f64 {
        if let Some(bar) = &self.last_bar {
            bar.close
        } else if let Some(quote) = &self.last_quote {
            quote.mid()
        } else {
            0.0
        }
    }

    /// Open of the last bar, for market-on-open pricing.
    pub fn open_price(&self) -> f64 {
        self.last_bar.map_or_else(|| self.price(), |b| b.open)
    }

    /// Volume of the last bar, for liquidity-capped fills.
    pub fn last_volume(&self) -> f64 {
        self.last_bar.map_or(0.0, |b| b.volume)
    }

    pub fn has_data(&self) -> bool {
        self.last_bar.is_some() || self.last_quote.is_some()
    }

    pub fn update_bar(&mut self, bar: Bar) {
        self.last_bar = Some(bar);
    }

    pub fn update_quote(&mut self, quote: Quote) {
        self.last_quote = Some(quote);
    }

    /// Rewrite the cached data point's price fields by the split factor so
    /// valuation is consistent immediately after the split, before the next
    /// update arrives.
    pub fn scale_cached_prices(&mut self, factor: f64) {
        if let Some(bar) = &mut self.last_bar {
            bar.scale_prices(factor);
        }
        if let Some(quote) = &mut self.last_quote {
            quote.scale_prices(factor);
        }
    }
}

/// The active security set, keyed by symbol.
#[derive(Default)]
pub struct Securities {
    map: HashMap<Symbol, Security>,
}

impl Securities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, security: Security) {
        self.map.insert(security.symbol.clone(), security);
    }

    pub fn remove(&mut self, symbol: &Symbol) -> Option<Security> {
        self.map.remove(symbol)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.map.contains_key(symbol)
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Security> {
        self.map.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &Symbol) -> Option<&mut Security> {
        self.map.get_mut(symbol)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &Security)> {
        self.map.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Symbol, &mut Security)> {
        self.map.iter_mut()
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.map.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn price_prefers_trade_over_quote() {
        let mut sec = Security::from_seed(SecuritySeed::us_equity("SPY"));
        assert_eq!(sec.price(), 0.0);

        sec.update_quote(Quote::new(99.0, 101.0));
        assert_eq!(sec.price(), 100.0);

        sec.update_bar(Bar::at(102.0, 1_000.0));
        assert_eq!(sec.price(), 102.0);
    }

    #[test]
    fn scale_cached_prices_hits_bar_and_quote() {
        let mut sec = Security::from_seed(SecuritySeed::us_equity("SPY"));
        sec.update_bar(Bar::at(100.0, 1_000.0));
        sec.update_quote(Quote::new(99.0, 101.0));

        sec.scale_cached_prices(0.5);
        assert_eq!(sec.last_bar.unwrap().close, 50.0);
        assert_eq!(sec.last_quote.unwrap().bid, 49.5);
        assert_eq!(sec.last_quote.unwrap().ask, 50.5);
    }

    #[test]
    fn market_hours_weekday_gate() {
        let hours = MarketHours::us_equity();
        let ten_am = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert!(hours.is_open(Weekday::Wed, ten_am));
        assert!(!hours.is_open(Weekday::Sat, ten_am));
        let pre_open = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert!(!hours.is_open(Weekday::Wed, pre_open));
    }

    #[test]
    fn securities_registry_roundtrip() {
        let mut securities = Securities::new();
        let sym = Symbol::equity("SPY");
        securities.add(Security::from_seed(SecuritySeed::us_equity("SPY")));

        assert!(securities.contains(&sym));
        assert_eq!(securities.len(), 1);
        assert!(securities.get(&sym).is_some());

        securities.remove(&sym);
        assert!(securities.is_empty());
    }
}
