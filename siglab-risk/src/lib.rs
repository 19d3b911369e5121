//! SigLab Risk: risk quantification, allocation and position sizing.
//!
//! Consumes the per-instrument decisions of `siglab-core` together with
//! historical returns:
//! - Risk metrics (VaR/CVaR, drawdown, Sharpe/Sortino/Calmar, benchmark stats)
//! - Seeded, cancellable Monte Carlo terminal-value simulation
//! - Long-only optimizer (max-Sharpe, min-variance, risk parity, frontier)
//!   with a degraded equal-weight fallback
//! - Kelly sizing from win rate and payoff ratio
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod config;
pub mod kelly;
pub mod metrics;
pub mod monte_carlo;
pub mod optimizer;
pub mod portfolio;
pub mod report;
pub mod stats;

pub use config::{MonteCarloConfig, RiskConfig, RiskConfigError};
pub use kelly::{kelly_fraction, KellySizer};
pub use metrics::{BenchmarkComparison, ReturnMetrics, TradeStats};
pub use monte_carlo::{
    simulate, spawn_simulation, CancelToken, MonteCarloSummary, SimulationError, SimulationHandle,
};
pub use optimizer::{
    optimize, optimize_or_equal_weight, AllocationMethod, AllocationResult, Matrix,
    OptimizationError, OptimizationInput,
};
pub use portfolio::{PortfolioContext, PortfolioDecision, PositionSize};
pub use report::{RiskEngine, RiskError, RiskReport};
