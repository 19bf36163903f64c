//! Engine settings, loadable from TOML.

use serde::{Deserialize, Serialize};

/// Tunable engine parameters. Every field has a default, so a settings file
/// only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub account_currency: String,
    pub initial_cash: f64,
    /// Margin-call scan cadence in simulated minutes.
    pub margin_scan_minutes: u64,
    /// Cash-settlement scan cadence in simulated minutes.
    pub settlement_scan_minutes: u64,
    /// Wall-clock ceiling for processing one slice, in seconds. Zero
    /// disables the watchdog.
    pub slice_timeout_seconds: u64,
    /// Finest data resolution in seconds; governs the live warm-up handover
    /// window.
    pub minimum_resolution_seconds: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            account_currency: "USD".into(),
            initial_cash: 100_000.0,
            margin_scan_minutes: 5,
            settlement_scan_minutes: 30,
            slice_timeout_seconds: 600,
            minimum_resolution_seconds: 60,
        }
    }
}

impl EngineSettings {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.account_currency, "USD");
        assert_eq!(settings.margin_scan_minutes, 5);
        assert_eq!(settings.settlement_scan_minutes, 30);
        assert_eq!(settings.slice_timeout_seconds, 600);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let settings =
            EngineSettings::from_toml_str("initial_cash = 250000.0\naccount_currency = \"EUR\"\n")
                .unwrap();
        assert_eq!(settings.initial_cash, 250_000.0);
        assert_eq!(settings.account_currency, "EUR");
        assert_eq!(settings.margin_scan_minutes, 5);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(EngineSettings::from_toml_str("initial_cash = \"lots\"").is_err());
    }
}
