use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger commit behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Max transactions drained into a single block
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Leading hex zeros required on block hashes (0 disables mining)
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    /// Simulated consensus delay bounds in seconds, uniform draw per commit
    #[serde(default = "default_consensus_delay")]
    pub consensus_delay_secs: [f64; 2],
}

fn default_batch_size() -> usize {
    10
}

fn default_difficulty() -> usize {
    2
}

fn default_consensus_delay() -> [f64; 2] {
    [0.10, 0.25]
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            difficulty: default_difficulty(),
            consensus_delay_secs: default_consensus_delay(),
        }
    }
}

impl LedgerConfig {
    /// Zero-delay, zero-difficulty variant for fast deterministic tests
    pub fn fast() -> Self {
        Self {
            batch_size: default_batch_size(),
            difficulty: 0,
            consensus_delay_secs: [0.0, 0.0],
        }
    }
}

/// Smart-contract policy thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    /// Upper autonomous purchase limit (monetary units)
    #[serde(default = "default_max_single_purchase")]
    pub max_single_purchase: Decimal,
    /// Minimum agent confidence required for autonomous execution
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_max_single_purchase() -> Decimal {
    Decimal::from(50_000)
}

fn default_min_confidence() -> f64 {
    0.70
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_single_purchase: default_max_single_purchase(),
            min_confidence: default_min_confidence(),
        }
    }
}

/// Coordination engine bounds
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinationConfig {
    /// Wall-clock budget for a full session (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum proposal-plus-critiques cycles before giving up
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_rounds() -> u32 {
    3
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_rounds: default_max_rounds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter directive (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file plus `BLOCKOPS_*`
    /// environment overrides (e.g. `BLOCKOPS_LEDGER__DIFFICULTY=0`).
    pub fn load_from(path: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(Environment::with_prefix("BLOCKOPS").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.ledger.batch_size, 10);
        assert_eq!(cfg.ledger.difficulty, 2);
        assert_eq!(cfg.ledger.consensus_delay_secs, [0.10, 0.25]);
        assert_eq!(cfg.validator.max_single_purchase, Decimal::from(50_000));
        assert_eq!(cfg.validator.min_confidence, 0.70);
        assert_eq!(cfg.coordination.timeout_secs, 30);
        assert_eq!(cfg.coordination.max_rounds, 3);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let cfg = AppConfig::load_from("does-not-exist.toml").unwrap();
        assert_eq!(cfg.ledger.batch_size, 10);
        assert_eq!(cfg.coordination.max_rounds, 3);
    }
}
