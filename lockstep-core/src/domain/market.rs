//! Market data points delivered inside a time slice.

use serde::{Deserialize, Serialize};

/// One OHLCV trade bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Flat bar at a single price, volume supplied. Test and warm-up helper.
    pub fn at(price: f64, volume: f64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Scale every price field by `factor`, leaving volume untouched.
    ///
    /// Used when a split must rewrite the last known data point so holdings
    /// valuation stays consistent before the next update arrives.
    pub fn scale_prices(&mut self, factor: f64) {
        self.open *= factor;
        self.high *= factor;
        self.low *= factor;
        self.close *= factor;
    }
}

/// Top-of-book quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn new(bid: f64, ask: f64) -> Self {
        Self { bid, ask }
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Scale both sides by `factor` (split adjustment of the quote cache).
    pub fn scale_prices(&mut self, factor: f64) {
        self.bid *= factor;
        self.ask *= factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_at_is_flat() {
        let bar = Bar::at(100.0, 5_000.0);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 100.0);
        assert_eq!(bar.low, 100.0);
        assert_eq!(bar.close, 100.0);
        assert_eq!(bar.volume, 5_000.0);
    }

    #[test]
    fn scale_prices_leaves_volume() {
        let mut bar = Bar {
            open: 100.0,
            high: 102.0,
            low: 98.0,
            close: 101.0,
            volume: 1_000.0,
        };
        bar.scale_prices(0.5);
        assert_eq!(bar.open, 50.0);
        assert_eq!(bar.high, 51.0);
        assert_eq!(bar.low, 49.0);
        assert_eq!(bar.close, 50.5);
        assert_eq!(bar.volume, 1_000.0);
    }

    #[test]
    fn quote_mid() {
        let q = Quote::new(99.0, 101.0);
        assert_eq!(q.mid(), 100.0);
    }
}
