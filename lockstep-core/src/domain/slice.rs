//! Time slices: the unit of progression for the simulation loop.

use super::market::{Bar, Quote};
use super::security::SecuritySeed;
use super::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A cash dividend distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    pub symbol: Symbol,
    /// Cash paid per share held.
    pub distribution: f64,
    /// Price the distribution was computed against.
    pub reference_price: f64,
}

/// A stock split.
///
/// `split_factor` is the price-scale factor: 0.5 means a 2-for-1 split
/// (prices halve). Quantity is scaled by the factor and truncated; the
/// truncated remainder, in pre-split shares, is cashed out at the reference
/// price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub symbol: Symbol,
    pub split_factor: f64,
    pub reference_price: f64,
}

/// Stage of a delisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelistingKind {
    /// Last trading day announced; the instrument still trades.
    Warning,
    /// The instrument no longer trades. Open positions are liquidated.
    Delisted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delisting {
    pub symbol: Symbol,
    pub kind: DelistingKind,
}

/// Universe membership changes delivered in a slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityChanges {
    pub added: Vec<SecuritySeed>,
    pub removed: Vec<Symbol>,
}

impl SecurityChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A time-stamped bundle of everything arriving at one instant.
///
/// Slices are strictly non-decreasing in time; the loop treats an
/// out-of-order slice as a fatal protocol violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlice {
    pub time: DateTime<Utc>,
    pub bars: HashMap<Symbol, Bar>,
    pub quotes: HashMap<Symbol, Quote>,
    /// Conversion-rate updates: currency code -> rate into account currency.
    pub conversion_rates: HashMap<String, f64>,
    pub security_changes: SecurityChanges,
    pub dividends: Vec<Dividend>,
    pub splits: Vec<Split>,
    pub delistings: Vec<Delisting>,
}

impl TimeSlice {
    pub fn empty(time: DateTime<Utc>) -> Self {
        Self {
            time,
            bars: HashMap::new(),
            quotes: HashMap::new(),
            conversion_rates: HashMap::new(),
            security_changes: SecurityChanges::default(),
            dividends: Vec::new(),
            splits: Vec::new(),
            delistings: Vec::new(),
        }
    }

    pub fn with_bar(mut self, symbol: Symbol, bar: Bar) -> Self {
        self.bars.insert(symbol, bar);
        self
    }

    pub fn with_quote(mut self, symbol: Symbol, quote: Quote) -> Self {
        self.quotes.insert(symbol, quote);
        self
    }

    /// Number of data points carried by this slice.
    pub fn count(&self) -> usize {
        self.bars.len()
            + self.quotes.len()
            + self.conversion_rates.len()
            + self.dividends.len()
            + self.splits.len()
            + self.delistings.len()
            + self.security_changes.added.len()
            + self.security_changes.removed.len()
    }

    pub fn has_data(&self) -> bool {
        self.count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slice_counts_zero() {
        let slice = TimeSlice::empty(Utc::now());
        assert_eq!(slice.count(), 0);
        assert!(!slice.has_data());
    }

    #[test]
    fn count_sums_every_payload_kind() {
        let sym = Symbol::equity("SPY");
        let mut slice = TimeSlice::empty(Utc::now())
            .with_bar(sym.clone(), Bar::at(100.0, 1_000.0))
            .with_quote(sym.clone(), Quote::new(99.0, 101.0));
        slice.conversion_rates.insert("EUR".into(), 1.1);
        slice.dividends.push(Dividend {
            symbol: sym.clone(),
            distribution: 0.5,
            reference_price: 100.0,
        });
        slice.splits.push(Split {
            symbol: sym.clone(),
            split_factor: 0.5,
            reference_price: 100.0,
        });
        slice.delistings.push(Delisting {
            symbol: sym,
            kind: DelistingKind::Warning,
        });

        assert_eq!(slice.count(), 6);
        assert!(slice.has_data());
    }
}
