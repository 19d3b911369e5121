//! Serializable risk and portfolio configuration.
//!
//! ```toml
//! risk_free_rate = 0.02
//! kelly_fraction = 0.25
//! allocation_method = "risk_parity"
//!
//! [monte_carlo]
//! paths = 20000
//! seed = 7
//! ```
//!
//! Every field has a default, so an empty document is a valid configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::optimizer::AllocationMethod;

#[derive(Debug, Error)]
pub enum RiskConfigError {
    #[error("failed to parse risk config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid risk parameter {name} = {value}: {reason}")]
    Invalid {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

// ─── Monte Carlo ─────────────────────────────────────────────────────

fn default_paths() -> usize {
    10_000
}

fn default_horizon() -> usize {
    252
}

fn default_mc_seed() -> u64 {
    42
}

fn default_chunk_size() -> usize {
    500
}

/// Monte Carlo simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    #[serde(default = "default_paths")]
    pub paths: usize,
    /// Periods simulated per path.
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default = "default_mc_seed")]
    pub seed: u64,
    /// Paths per work unit; each chunk owns one RNG stream.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Worker threads for the simulation pool. 0 means one per core.
    #[serde(default)]
    pub threads: usize,
    /// Abort with `SimulationError::TimedOut` after this many milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            paths: default_paths(),
            horizon: default_horizon(),
            seed: default_mc_seed(),
            chunk_size: default_chunk_size(),
            threads: 0,
            timeout_ms: None,
        }
    }
}

// ─── Risk engine ─────────────────────────────────────────────────────

fn default_risk_free_rate() -> f64 {
    0.02
}

fn default_periods_per_year() -> usize {
    252
}

fn default_kelly_fraction() -> f64 {
    0.25
}

fn default_max_position_fraction() -> f64 {
    1.0
}

fn default_frontier_points() -> usize {
    50
}

fn default_min_history() -> usize {
    30
}

fn default_max_history() -> usize {
    2520
}

fn default_min_trades() -> usize {
    10
}

fn default_payoff_ratio() -> f64 {
    2.0
}

/// Top-level risk, sizing and allocation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Annual risk-free rate.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: usize,
    /// Conservative multiplier applied to the full Kelly fraction.
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: f64,
    #[serde(default = "default_frontier_points")]
    pub frontier_points: usize,
    #[serde(default)]
    pub allocation_method: AllocationMethod,
    /// Return observations an instrument needs before it can be allocated.
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    /// Most recent returns and trades kept per instrument.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Closed trades needed before Kelly uses trade statistics instead of
    /// signal confidence.
    #[serde(default = "default_min_trades")]
    pub min_trades: usize,
    /// Payoff ratio assumed when there is no trade history.
    #[serde(default = "default_payoff_ratio")]
    pub default_payoff_ratio: f64,
    #[serde(default)]
    pub monte_carlo: MonteCarloConfig,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            periods_per_year: default_periods_per_year(),
            kelly_fraction: default_kelly_fraction(),
            max_position_fraction: default_max_position_fraction(),
            frontier_points: default_frontier_points(),
            allocation_method: AllocationMethod::default(),
            min_history: default_min_history(),
            max_history: default_max_history(),
            min_trades: default_min_trades(),
            default_payoff_ratio: default_payoff_ratio(),
            monte_carlo: MonteCarloConfig::default(),
        }
    }
}

impl RiskConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, RiskConfigError> {
        let config: RiskConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RiskConfigError> {
        let invalid = |name, value: f64, reason| {
            Err(RiskConfigError::Invalid {
                name,
                value,
                reason,
            })
        };
        if !self.risk_free_rate.is_finite() {
            return invalid("risk_free_rate", self.risk_free_rate, "must be finite");
        }
        if self.periods_per_year == 0 {
            return invalid("periods_per_year", 0.0, "must be positive");
        }
        if !(self.kelly_fraction > 0.0 && self.kelly_fraction <= 1.0) {
            return invalid("kelly_fraction", self.kelly_fraction, "expected a value in (0, 1]");
        }
        if !(self.max_position_fraction > 0.0 && self.max_position_fraction <= 1.0) {
            return invalid(
                "max_position_fraction",
                self.max_position_fraction,
                "expected a value in (0, 1]",
            );
        }
        if self.frontier_points == 0 {
            return invalid("frontier_points", 0.0, "must be positive");
        }
        if self.min_history < 2 {
            return invalid("min_history", self.min_history as f64, "need at least 2 returns");
        }
        if self.max_history < self.min_history {
            return invalid(
                "max_history",
                self.max_history as f64,
                "must be at least min_history",
            );
        }
        if !(self.default_payoff_ratio.is_finite() && self.default_payoff_ratio > 0.0) {
            return invalid(
                "default_payoff_ratio",
                self.default_payoff_ratio,
                "must be positive",
            );
        }
        let mc = &self.monte_carlo;
        if mc.paths == 0 {
            return invalid("monte_carlo.paths", 0.0, "must be positive");
        }
        if mc.horizon == 0 {
            return invalid("monte_carlo.horizon", 0.0, "must be positive");
        }
        if mc.chunk_size == 0 {
            return invalid("monte_carlo.chunk_size", 0.0, "must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = RiskConfig::from_toml_str("").unwrap();
        assert_eq!(config, RiskConfig::default());
        assert_eq!(config.risk_free_rate, 0.02);
        assert_eq!(config.periods_per_year, 252);
        assert_eq!(config.kelly_fraction, 0.25);
        assert_eq!(config.max_position_fraction, 1.0);
        assert_eq!(config.frontier_points, 50);
        assert_eq!(config.max_history, 2520);
        assert_eq!(config.monte_carlo.paths, 10_000);
        assert_eq!(config.monte_carlo.horizon, 252);
        assert_eq!(config.monte_carlo.seed, 42);
        assert_eq!(config.monte_carlo.chunk_size, 500);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = RiskConfig::from_toml_str(
            r#"
kelly_fraction = 0.5
allocation_method = "risk_parity"

[monte_carlo]
paths = 2000
timeout_ms = 1500
"#,
        )
        .unwrap();
        assert_eq!(config.kelly_fraction, 0.5);
        assert_eq!(config.allocation_method, AllocationMethod::RiskParity);
        assert_eq!(config.monte_carlo.paths, 2000);
        assert_eq!(config.monte_carlo.horizon, 252);
        assert_eq!(config.monte_carlo.timeout_ms, Some(1500));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            RiskConfig::from_toml_str("kelly_fraction = 1.5"),
            Err(RiskConfigError::Invalid { name: "kelly_fraction", .. })
        ));
        assert!(matches!(
            RiskConfig::from_toml_str("[monte_carlo]\npaths = 0"),
            Err(RiskConfigError::Invalid { name: "monte_carlo.paths", .. })
        ));
        assert!(matches!(
            RiskConfig::from_toml_str("min_history = 40\nmax_history = 20"),
            Err(RiskConfigError::Invalid { name: "max_history", .. })
        ));
        assert!(matches!(
            RiskConfig::from_toml_str("max_position_fraction = 0.0"),
            Err(RiskConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            RiskConfig::from_toml_str("risk_free_rate = \"high\""),
            Err(RiskConfigError::Parse(_))
        ));
    }
}
