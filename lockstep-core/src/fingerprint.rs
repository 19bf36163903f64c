//! Deterministic run identification.
//!
//! A run id is the BLAKE3 hash of the canonical JSON of the algorithm name
//! and its engine settings: the same configuration always produces the same
//! id, across builds and platforms.

use crate::settings::EngineSettings;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a run: which algorithm, with which settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFingerprint {
    pub algorithm_name: String,
    pub settings: EngineSettings,
}

impl RunFingerprint {
    pub fn new(algorithm_name: impl Into<String>, settings: EngineSettings) -> Self {
        Self {
            algorithm_name: algorithm_name.into(),
            settings,
        }
    }

    pub fn run_id(&self) -> RunId {
        let canonical = serde_json::json!({
            "algorithm": &self.algorithm_name,
            "settings": &self.settings,
        });
        let hash = blake3::hash(canonical.to_string().as_bytes());
        RunId(hash.to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_id() {
        let a = RunFingerprint::new("momentum", EngineSettings::default());
        let b = RunFingerprint::new("momentum", EngineSettings::default());
        assert_eq!(a.run_id(), b.run_id());
    }

    #[test]
    fn different_settings_different_id() {
        let a = RunFingerprint::new("momentum", EngineSettings::default());
        let mut settings = EngineSettings::default();
        settings.initial_cash = 1.0;
        let b = RunFingerprint::new("momentum", settings);
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn different_name_different_id() {
        let a = RunFingerprint::new("momentum", EngineSettings::default());
        let b = RunFingerprint::new("reversion", EngineSettings::default());
        assert_ne!(a.run_id(), b.run_id());
    }
}
