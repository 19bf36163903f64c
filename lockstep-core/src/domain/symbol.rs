//! Symbols and per-symbol reference data.
//!
//! A symbol is a (market, security type, ticker) triple: the same ticker can
//! trade on multiple venues as different instruments, so the ticker alone is
//! not a valid map key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Asset class of a tradeable instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityType {
    Equity,
    Future,
    Forex,
    Crypto,
}

/// Unique instrument key: market venue + security type + ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub market: String,
    pub security_type: SecurityType,
    pub ticker: String,
}

impl Symbol {
    pub fn new(
        market: impl Into<String>,
        security_type: SecurityType,
        ticker: impl Into<String>,
    ) -> Self {
        Self {
            market: market.into(),
            security_type,
            ticker: ticker.into(),
        }
    }

    /// US equity shorthand used throughout tests and defaults.
    pub fn equity(ticker: impl Into<String>) -> Self {
        Self::new("usa", SecurityType::Equity, ticker)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}/{})", self.ticker, self.security_type, self.market)
    }
}

/// Reference data keyed by symbol: contract scale and quoting conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolProperties {
    /// Units of quote currency per point of price movement per unit quantity.
    pub contract_multiplier: f64,
    /// Minimum price variation.
    pub pip_size: f64,
    /// Minimum order quantity step.
    pub lot_size: f64,
    /// Currency the instrument is quoted in.
    pub quote_currency: String,
}

impl SymbolProperties {
    pub fn new(
        contract_multiplier: f64,
        pip_size: f64,
        lot_size: f64,
        quote_currency: impl Into<String>,
    ) -> Self {
        Self {
            contract_multiplier,
            pip_size,
            lot_size,
            quote_currency: quote_currency.into(),
        }
    }

    /// Defaults for a US-listed share: multiplier 1, penny ticks, USD quote.
    pub fn us_equity() -> Self {
        Self::new(1.0, 0.01, 1.0, "USD")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn symbol_is_a_usable_map_key() {
        let mut map = HashMap::new();
        map.insert(Symbol::equity("SPY"), 1);
        map.insert(Symbol::new("india", SecurityType::Equity, "SPY"), 2);
        // Same ticker, different market: distinct keys.
        assert_eq!(map.len(), 2);
        assert_eq!(map[&Symbol::equity("SPY")], 1);
    }

    #[test]
    fn us_equity_defaults() {
        let props = SymbolProperties::us_equity();
        assert_eq!(props.contract_multiplier, 1.0);
        assert_eq!(props.quote_currency, "USD");
    }

    #[test]
    fn symbol_display_includes_market() {
        let sym = Symbol::equity("AAPL");
        let s = sym.to_string();
        assert!(s.contains("AAPL"));
        assert!(s.contains("usa"));
    }
}
