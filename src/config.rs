use std::env;
use std::path::PathBuf;

use crate::models::Thresholds;

/// Engine configuration, read from the environment with defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Echoed in predictions; does not change banding.
    pub high_risk_threshold: f64,

    /// Echoed in predictions; does not change banding.
    pub medium_risk_threshold: f64,

    /// Seed for the train/holdout split
    pub random_seed: u64,

    /// Gradient descent iteration cap
    pub max_iter: usize,

    pub model_path: PathBuf,

    pub scaler_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            high_risk_threshold: 0.65,
            medium_risk_threshold: 0.45,
            random_seed: 42,
            max_iter: 1000,
            model_path: PathBuf::from("model.json"),
            scaler_path: PathBuf::from("scaler.json"),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            high_risk_threshold: lookup("HIGH_RISK_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.high_risk_threshold),

            medium_risk_threshold: lookup("MEDIUM_RISK_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.medium_risk_threshold),

            random_seed: lookup("RANDOM_SEED")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.random_seed),

            max_iter: lookup("MAX_ITER")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_iter),

            model_path: lookup("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),

            scaler_path: lookup("SCALER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.scaler_path),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            high: self.high_risk_threshold,
            medium: self.medium_risk_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_variables_use_defaults() {
        let config = EngineConfig::from_lookup(|_| None);
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.thresholds(), Thresholds { high: 0.65, medium: 0.45 });
    }

    #[test]
    fn variables_override_defaults() {
        let vars: HashMap<&str, &str> = [
            ("HIGH_RISK_THRESHOLD", "0.7"),
            ("RANDOM_SEED", "7"),
            ("MAX_ITER", "250"),
            ("MODEL_PATH", "/var/lib/risk/model.json"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.high_risk_threshold, 0.7);
        assert_eq!(config.medium_risk_threshold, 0.45);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.max_iter, 250);
        assert_eq!(config.model_path, PathBuf::from("/var/lib/risk/model.json"));
        assert_eq!(config.scaler_path, PathBuf::from("scaler.json"));
    }

    #[test]
    fn unparseable_values_fall_back() {
        let config = EngineConfig::from_lookup(|key| match key {
            "MAX_ITER" => Some("lots".to_string()),
            _ => None,
        });
        assert_eq!(config.max_iter, 1000);
    }
}
