//! Multi-currency cash book.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// One currency's balance and its conversion rate into the account currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cash {
    pub currency: String,
    pub amount: f64,
    /// Units of account currency per unit of this currency. The account
    /// currency itself is pinned at 1.0.
    pub conversion_rate: f64,
}

/// Mapping from currency code to balance and conversion rate.
///
/// Invariant: exactly one entry is the account currency, and its conversion
/// rate is always 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashBook {
    account_currency: String,
    entries: HashMap<String, Cash>,
}

impl CashBook {
    pub fn new(account_currency: impl Into<String>, initial_amount: f64) -> Self {
        let account_currency = account_currency.into();
        let mut entries = HashMap::new();
        entries.insert(
            account_currency.clone(),
            Cash {
                currency: account_currency.clone(),
                amount: initial_amount,
                conversion_rate: 1.0,
            },
        );
        Self {
            account_currency,
            entries,
        }
    }

    pub fn account_currency(&self) -> &str {
        &self.account_currency
    }

    /// Ensure an entry exists for `currency`. New entries start at zero with
    /// an unknown (zero) conversion rate until a slice delivers one.
    pub fn ensure_currency(&mut self, currency: &str) {
        self.entries.entry(currency.to_string()).or_insert_with(|| Cash {
            currency: currency.to_string(),
            amount: 0.0,
            conversion_rate: 0.0,
        });
    }

    pub fn get(&self, currency: &str) -> Option<&Cash> {
        self.entries.get(currency)
    }

    /// Conversion rate into the account currency; 0.0 until known.
    pub fn conversion_rate(&self, currency: &str) -> f64 {
        self.entries.get(currency).map_or(0.0, |c| c.conversion_rate)
    }

    /// Add (or subtract) an amount of `currency`.
    pub fn add(&mut self, currency: &str, amount: f64) {
        self.ensure_currency(currency);
        if let Some(entry) = self.entries.get_mut(currency) {
            entry.amount += amount;
        }
    }

    /// Update a currency's conversion rate from slice data. Updates to the
    /// account currency are ignored: its rate is 1.0 by definition.
    pub fn update_conversion_rate(&mut self, currency: &str, rate: f64) {
        if currency == self.account_currency {
            warn!(currency, "ignoring conversion-rate update for account currency");
            return;
        }
        self.ensure_currency(currency);
        if let Some(entry) = self.entries.get_mut(currency) {
            entry.conversion_rate = rate;
        }
    }

    /// Balance of the account currency.
    pub fn account_balance(&self) -> f64 {
        self.entries[&self.account_currency].amount
    }

    /// Total value of all entries, converted to the account currency.
    pub fn total_value(&self) -> f64 {
        self.entries
            .values()
            .map(|c| c.amount * c.conversion_rate)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cash> {
        self.entries.values()
    }
}

/// A cash amount not yet available: proceeds awaiting settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsettledFunds {
    pub currency: String,
    pub amount: f64,
    pub available_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_currency_pinned_at_one() {
        let book = CashBook::new("USD", 100_000.0);
        assert_eq!(book.conversion_rate("USD"), 1.0);
        assert_eq!(book.account_balance(), 100_000.0);
    }

    #[test]
    fn account_currency_rate_update_is_ignored() {
        let mut book = CashBook::new("USD", 1_000.0);
        book.update_conversion_rate("USD", 2.0);
        assert_eq!(book.conversion_rate("USD"), 1.0);
    }

    #[test]
    fn unknown_currency_has_zero_rate_until_updated() {
        let mut book = CashBook::new("USD", 0.0);
        book.ensure_currency("EUR");
        assert_eq!(book.conversion_rate("EUR"), 0.0);
        book.update_conversion_rate("EUR", 1.1);
        assert_eq!(book.conversion_rate("EUR"), 1.1);
    }

    #[test]
    fn total_value_converts_every_entry() {
        let mut book = CashBook::new("USD", 1_000.0);
        book.add("EUR", 500.0);
        book.update_conversion_rate("EUR", 1.2);
        // 1000 * 1.0 + 500 * 1.2 = 1600
        assert_eq!(book.total_value(), 1_600.0);
    }

    #[test]
    fn add_creates_entries_on_demand() {
        let mut book = CashBook::new("USD", 0.0);
        book.add("JPY", 10_000.0);
        assert_eq!(book.get("JPY").unwrap().amount, 10_000.0);
    }
}
