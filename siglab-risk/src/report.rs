//! RiskEngine: one call from a return series to a full `RiskReport`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{RiskConfig, RiskConfigError};
use crate::metrics::{scale_to_horizon, BenchmarkComparison, ReturnMetrics};
use crate::monte_carlo::{simulate, CancelToken, MonteCarloSummary, SimulationError};
use crate::optimizer::{
    efficient_frontier, summarize, FrontierPoint, OptimizationError, OptimizationInput,
    OptimizationSummary,
};
use crate::stats::{mean, std_dev};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    #[error("need {required} return observations, have {available}")]
    InsufficientReturns { available: usize, required: usize },
    #[error("return series contains non-finite values")]
    NonFiniteReturns,
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub cvar_99: f64,
    /// One-period VaR_95 scaled to the Monte Carlo horizon.
    pub horizon_var_95: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub observations: usize,
    pub monte_carlo: MonteCarloSummary,
}

impl RiskReport {
    fn new(metrics: ReturnMetrics, horizon: usize, monte_carlo: MonteCarloSummary) -> Self {
        Self {
            var_95: metrics.var_95,
            var_99: metrics.var_99,
            cvar_95: metrics.cvar_95,
            cvar_99: metrics.cvar_99,
            horizon_var_95: scale_to_horizon(metrics.var_95, horizon),
            max_drawdown: metrics.max_drawdown,
            sharpe: metrics.sharpe,
            sortino: metrics.sortino,
            calmar: metrics.calmar,
            annualized_return: metrics.annualized_return,
            annualized_volatility: metrics.annualized_volatility,
            observations: metrics.observations,
            monte_carlo,
        }
    }
}

/// Stateless apart from its configuration; construct once and share.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Result<Self, RiskConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    fn check(&self, returns: &[f64]) -> Result<(), RiskError> {
        if returns.len() < self.config.min_history {
            return Err(RiskError::InsufficientReturns {
                available: returns.len(),
                required: self.config.min_history,
            });
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(RiskError::NonFiniteReturns);
        }
        Ok(())
    }

    /// Historical metrics without simulation.
    pub fn metrics(&self, returns: &[f64]) -> Result<ReturnMetrics, RiskError> {
        self.check(returns)?;
        Ok(ReturnMetrics::compute(
            returns,
            self.config.risk_free_rate,
            self.config.periods_per_year,
        ))
    }

    pub fn report(&self, returns: &[f64]) -> Result<RiskReport, RiskError> {
        self.report_cancellable(returns, &CancelToken::new())
    }

    /// Full report. A cancelled or failed simulation yields no report.
    pub fn report_cancellable(
        &self,
        returns: &[f64],
        cancel: &CancelToken,
    ) -> Result<RiskReport, RiskError> {
        let metrics = self.metrics(returns)?;
        let mc = &self.config.monte_carlo;
        let summary = simulate(mean(returns), std_dev(returns), mc, cancel).map_err(|e| {
            warn!(error = %e, "risk report dropped, simulation failed");
            RiskError::from(e)
        })?;
        debug!(
            observations = metrics.observations,
            var_95 = metrics.var_95,
            sharpe = metrics.sharpe,
            p_profit = summary.probability_profit,
            "risk report built"
        );
        Ok(RiskReport::new(metrics, mc.horizon, summary))
    }

    pub fn compare_to_benchmark(
        &self,
        returns: &[f64],
        benchmark: &[f64],
    ) -> Option<BenchmarkComparison> {
        BenchmarkComparison::compute(returns, benchmark, self.config.periods_per_year)
    }

    /// Annualized optimization input from aligned per-instrument returns.
    pub fn optimization_input(
        &self,
        instruments: Vec<String>,
        returns: &[Vec<f64>],
    ) -> Result<OptimizationInput, OptimizationError> {
        OptimizationInput::from_returns(
            instruments,
            returns,
            self.config.periods_per_year,
            self.config.risk_free_rate,
        )
    }

    pub fn frontier(
        &self,
        input: &OptimizationInput,
    ) -> Result<Vec<FrontierPoint>, OptimizationError> {
        efficient_frontier(input, self.config.frontier_points)
    }

    pub fn optimization_summary(&self, input: &OptimizationInput) -> OptimizationSummary {
        summarize(input)
    }
}
