//! Serializable engine configuration.
//!
//! Strategies are configured as `(id, kind, params)` triples, the way they
//! appear in TOML:
//!
//! ```toml
//! timeframe_secs = 3600
//! seed = 42
//!
//! [[strategies]]
//! id = 1
//! kind = "trend_rsi_ema_atr"
//! params = { rsi_period = 14, oversold = 30.0 }
//! ```
//!
//! Missing parameters fall back to each strategy's defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ConfigFingerprint, StrategyId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid parameter {name} = {value} for {kind}: {reason}")]
    InvalidParam {
        kind: &'static str,
        name: String,
        value: f64,
        reason: &'static str,
    },
    #[error("duplicate strategy id {0}")]
    DuplicateId(StrategyId),
}

/// The closed set of strategy variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    TrendRsiEmaAtr,
    ZscorePhi,
    FibonacciConfluence,
    MlEnsemble,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::TrendRsiEmaAtr => "trend_rsi_ema_atr",
            StrategyKind::ZscorePhi => "zscore_phi",
            StrategyKind::FibonacciConfluence => "fibonacci_confluence",
            StrategyKind::MlEnsemble => "ml_ensemble",
        }
    }
}

/// Configuration of one strategy instance.
///
/// Uses `BTreeMap` for deterministic key ordering during serialization → hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: StrategyId,
    pub kind: StrategyKind,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl StrategyConfig {
    pub fn new(id: u32, kind: StrategyKind) -> Self {
        Self {
            id: StrategyId(id),
            kind,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Exact identity: kind + all parameter values.
    pub fn fingerprint(&self) -> ConfigFingerprint {
        let mut canonical = String::from(self.kind.as_str());
        for (k, v) in &self.params {
            canonical.push_str(&format!("|{k}={v:?}"));
        }
        ConfigFingerprint::from_bytes(canonical.as_bytes())
    }

    /// Named f64 parameter, falling back to `default`.
    pub fn param(&self, name: &str, default: f64) -> f64 {
        self.params.get(name).copied().unwrap_or(default)
    }

    /// Named positive integer parameter, falling back to `default`.
    pub fn param_usize(&self, name: &str, default: usize) -> Result<usize, ConfigError> {
        match self.params.get(name).copied() {
            None => Ok(default),
            Some(v) if v.is_finite() && v >= 1.0 && v.fract() == 0.0 => Ok(v as usize),
            Some(v) => Err(self.invalid(name, v, "expected a positive integer")),
        }
    }

    /// Named f64 parameter that must be finite and strictly positive.
    pub fn param_positive(&self, name: &str, default: f64) -> Result<f64, ConfigError> {
        let v = self.param(name, default);
        if v.is_finite() && v > 0.0 {
            Ok(v)
        } else {
            Err(self.invalid(name, v, "expected a positive number"))
        }
    }

    /// Named f64 parameter that must lie in [0, 1].
    pub fn param_fraction(&self, name: &str, default: f64) -> Result<f64, ConfigError> {
        let v = self.param(name, default);
        if (0.0..=1.0).contains(&v) {
            Ok(v)
        } else {
            Err(self.invalid(name, v, "expected a value in [0, 1]"))
        }
    }

    pub(crate) fn invalid(&self, name: &str, value: f64, reason: &'static str) -> ConfigError {
        ConfigError::InvalidParam {
            kind: self.kind.as_str(),
            name: name.to_string(),
            value,
            reason,
        }
    }
}

fn default_timeframe_secs() -> i64 {
    86_400
}

fn default_seed() -> u64 {
    42
}

/// Top-level signal engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Expected spacing between bars; larger gaps are flagged on the window.
    #[serde(default = "default_timeframe_secs")]
    pub timeframe_secs: i64,
    /// Master seed for every random stream (model training).
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeframe_secs: default_timeframe_secs(),
            seed: default_seed(),
            strategies: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Strategy ids must be unique: they are the tie-break priority order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        for s in &self.strategies {
            if !seen.insert(s.id) {
                return Err(ConfigError::DuplicateId(s.id));
            }
        }
        Ok(())
    }
}
