//! The engine clock: one authoritative UTC instant with per-exchange views.

use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TimeError {
    #[error("clock moved backwards: {current} -> {attempted}")]
    NonMonotonic {
        current: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },
}

/// Tracks "now" for the simulation.
///
/// There is exactly one clock per run; local times for every subscribed
/// exchange are derived views of the same UTC instant, so they can never
/// disagree after conversion. In backtest mode the clock only moves forward:
/// a backwards set is a fatal protocol violation reported as an error, never
/// silently corrected.
#[derive(Debug, Clone)]
pub struct TimeKeeper {
    utc: DateTime<Utc>,
    /// Per-exchange UTC offsets, keyed by exchange name.
    offsets: HashMap<String, FixedOffset>,
    monotonic: bool,
}

impl TimeKeeper {
    /// A monotonic clock (backtest mode), starting at `start`.
    pub fn backtest(start: DateTime<Utc>) -> Self {
        Self {
            utc: start,
            offsets: HashMap::new(),
            monotonic: true,
        }
    }

    /// A live clock: monotonicity violations are tolerated (wall clocks
    /// step on NTP adjustments) but still never move the stored instant back.
    pub fn live(start: DateTime<Utc>) -> Self {
        Self {
            utc: start,
            offsets: HashMap::new(),
            monotonic: false,
        }
    }

    pub fn utc(&self) -> DateTime<Utc> {
        self.utc
    }

    /// Register an exchange's offset so local views can be served.
    pub fn add_exchange(&mut self, name: impl Into<String>, offset: FixedOffset) {
        self.offsets.insert(name.into(), offset);
    }

    /// Advance the clock. In backtest mode `t` must be >= the current
    /// instant; in live mode an earlier `t` is ignored.
    pub fn set_utc(&mut self, t: DateTime<Utc>) -> Result<(), TimeError> {
        if t < self.utc {
            if self.monotonic {
                return Err(TimeError::NonMonotonic {
                    current: self.utc,
                    attempted: t,
                });
            }
            return Ok(());
        }
        self.utc = t;
        Ok(())
    }

    /// Local time at a registered exchange; UTC if the exchange is unknown.
    pub fn local_time(&self, exchange: &str) -> DateTime<FixedOffset> {
        let offset = self
            .offsets
            .get(exchange)
            .copied()
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
        self.utc.with_timezone(&offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    #[test]
    fn backtest_clock_advances() {
        let mut clock = TimeKeeper::backtest(t(9, 30));
        clock.set_utc(t(9, 31)).unwrap();
        assert_eq!(clock.utc(), t(9, 31));
        // Equal time is fine (multiple slices can share an instant).
        clock.set_utc(t(9, 31)).unwrap();
    }

    #[test]
    fn backtest_clock_rejects_backwards() {
        let mut clock = TimeKeeper::backtest(t(10, 0));
        let err = clock.set_utc(t(9, 59)).unwrap_err();
        assert!(matches!(err, TimeError::NonMonotonic { .. }));
        // The clock is untouched after the rejected set.
        assert_eq!(clock.utc(), t(10, 0));
    }

    #[test]
    fn live_clock_ignores_backwards() {
        let mut clock = TimeKeeper::live(t(10, 0));
        clock.set_utc(t(9, 59)).unwrap();
        assert_eq!(clock.utc(), t(10, 0));
    }

    #[test]
    fn local_views_agree_with_utc() {
        let mut clock = TimeKeeper::backtest(t(15, 0));
        clock.add_exchange("new-york", FixedOffset::west_opt(5 * 3600).unwrap());
        clock.add_exchange("tokyo", FixedOffset::east_opt(9 * 3600).unwrap());

        let ny = clock.local_time("new-york");
        let tokyo = clock.local_time("tokyo");

        // Both views are the same instant.
        assert_eq!(ny.with_timezone(&Utc), clock.utc());
        assert_eq!(tokyo.with_timezone(&Utc), clock.utc());
        // And their wall-clock hours differ by the offsets.
        assert_eq!(ny.format("%H:%M").to_string(), "10:00");
        assert_eq!(tokyo.format("%H:%M").to_string(), "00:00");
    }

    #[test]
    fn unknown_exchange_falls_back_to_utc() {
        let clock = TimeKeeper::backtest(t(12, 0));
        assert_eq!(clock.local_time("nowhere").with_timezone(&Utc), t(12, 0));
    }
}
