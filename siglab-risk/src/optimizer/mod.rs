//! Portfolio optimizer: long-only allocation weights for a candidate set.
//!
//! Methods:
//! - `MaxSharpe`: maximize (wᵀμ − r_f)/√(wᵀΣw)
//! - `MinVariance`: minimize wᵀΣw
//! - `RiskParity`: equal marginal risk contribution wᵢ·(Σw)ᵢ
//! - `EqualWeight`: 1/n, also the fallback when a solver fails
//!
//! Every optimized method first checks that Σ is positive definite; a
//! singular covariance is an `OptimizationError`, and
//! `optimize_or_equal_weight` turns it into a degraded equal-weight result.

mod frontier;
mod matrix;
mod solver;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::stats::{covariance, mean};

pub use frontier::{efficient_frontier, FrontierPoint};
pub use matrix::Matrix;
pub use solver::project_simplex;

/// Weights below this are treated as zero when cleaning solver output.
const WEIGHT_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizationError {
    #[error("no assets to allocate")]
    NoAssets,
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("non-finite {0}")]
    NonFinite(&'static str),
    #[error("covariance matrix is singular or not positive definite (pivot {index})")]
    SingularCovariance { index: usize },
    #[error("infeasible: {0}")]
    Infeasible(String),
    #[error("solver did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    #[default]
    MaxSharpe,
    MinVariance,
    RiskParity,
    EqualWeight,
}

impl AllocationMethod {
    pub const ALL: [AllocationMethod; 4] = [
        AllocationMethod::EqualWeight,
        AllocationMethod::MaxSharpe,
        AllocationMethod::MinVariance,
        AllocationMethod::RiskParity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMethod::MaxSharpe => "max_sharpe",
            AllocationMethod::MinVariance => "min_variance",
            AllocationMethod::RiskParity => "risk_parity",
            AllocationMethod::EqualWeight => "equal_weight",
        }
    }
}

impl std::fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annualized expected returns and covariance for a named asset set.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationInput {
    instruments: Vec<String>,
    mu: Vec<f64>,
    cov: Matrix,
    risk_free_rate: f64,
}

impl OptimizationInput {
    pub fn new(
        instruments: Vec<String>,
        mu: Vec<f64>,
        cov: Matrix,
        risk_free_rate: f64,
    ) -> Result<Self, OptimizationError> {
        let n = instruments.len();
        if n == 0 {
            return Err(OptimizationError::NoAssets);
        }
        if mu.len() != n {
            return Err(OptimizationError::DimensionMismatch {
                expected: n,
                found: mu.len(),
            });
        }
        if cov.n() != n {
            return Err(OptimizationError::DimensionMismatch {
                expected: n,
                found: cov.n(),
            });
        }
        if mu.iter().any(|m| !m.is_finite()) {
            return Err(OptimizationError::NonFinite("expected returns"));
        }
        if !risk_free_rate.is_finite() {
            return Err(OptimizationError::NonFinite("risk-free rate"));
        }
        if !cov.is_symmetric(1e-12) {
            return Err(OptimizationError::Infeasible("covariance is not symmetric".into()));
        }
        Ok(Self {
            instruments,
            mu,
            cov,
            risk_free_rate,
        })
    }

    /// Estimate annualized μ = mean·periods and Σ = cov·periods from
    /// equally long per-period return series.
    pub fn from_returns(
        instruments: Vec<String>,
        returns: &[Vec<f64>],
        periods_per_year: usize,
        risk_free_rate: f64,
    ) -> Result<Self, OptimizationError> {
        if instruments.is_empty() {
            return Err(OptimizationError::NoAssets);
        }
        if returns.len() != instruments.len() {
            return Err(OptimizationError::DimensionMismatch {
                expected: instruments.len(),
                found: returns.len(),
            });
        }
        let len = returns.first().map_or(0, Vec::len);
        if let Some(bad) = returns.iter().find(|r| r.len() != len) {
            return Err(OptimizationError::DimensionMismatch {
                expected: len,
                found: bad.len(),
            });
        }
        if len < 2 {
            return Err(OptimizationError::Infeasible(
                "need at least two return observations".into(),
            ));
        }
        if returns.iter().flatten().any(|r| !r.is_finite()) {
            return Err(OptimizationError::NonFinite("returns"));
        }
        let periods = periods_per_year as f64;
        let mu = returns.iter().map(|r| mean(r) * periods).collect();
        let rows: Vec<Vec<f64>> = returns
            .iter()
            .map(|a| returns.iter().map(|b| covariance(a, b)).collect())
            .collect();
        let cov = Matrix::from_rows(&rows)?.scaled(periods);
        Self::new(instruments, mu, cov, risk_free_rate)
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    pub fn expected_returns(&self) -> &[f64] {
        &self.mu
    }

    pub fn covariance(&self) -> &Matrix {
        &self.cov
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    fn portfolio_return(&self, w: &[f64]) -> f64 {
        self.mu.iter().zip(w).map(|(m, x)| m * x).sum()
    }

    fn portfolio_volatility(&self, w: &[f64]) -> f64 {
        self.cov.quad_form(w).max(0.0).sqrt()
    }

    fn sharpe(&self, w: &[f64]) -> f64 {
        let vol = self.portfolio_volatility(w);
        if vol < 1e-15 {
            return 0.0;
        }
        (self.portfolio_return(w) - self.risk_free_rate) / vol
    }
}

/// Target allocation. Weights are non-negative and sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub weights: BTreeMap<String, f64>,
    pub method: AllocationMethod,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    /// Set when this is the equal-weight fallback for a failed optimization.
    pub degraded: bool,
}

impl AllocationResult {
    fn from_weights(input: &OptimizationInput, method: AllocationMethod, raw: &[f64]) -> Self {
        let w = clean_weights(raw);
        Self {
            weights: input
                .instruments
                .iter()
                .cloned()
                .zip(w.iter().copied())
                .collect(),
            method,
            expected_return: input.portfolio_return(&w),
            volatility: input.portfolio_volatility(&w),
            sharpe: input.sharpe(&w),
            degraded: false,
        }
    }

    pub fn weight(&self, instrument: &str) -> f64 {
        self.weights.get(instrument).copied().unwrap_or(0.0)
    }

    /// Weights in the input's instrument order.
    pub fn weight_vector(&self, instruments: &[String]) -> Vec<f64> {
        instruments.iter().map(|i| self.weight(i)).collect()
    }
}

/// Clamp tiny or negative solver noise to zero and renormalize.
fn clean_weights(raw: &[f64]) -> Vec<f64> {
    let clipped: Vec<f64> = raw
        .iter()
        .map(|w| if w.is_finite() && *w > WEIGHT_FLOOR { *w } else { 0.0 })
        .collect();
    let total: f64 = clipped.iter().sum();
    if total <= 0.0 {
        return vec![1.0 / raw.len() as f64; raw.len()];
    }
    clipped.iter().map(|w| w / total).collect()
}

pub fn equal_weight(input: &OptimizationInput) -> AllocationResult {
    let n = input.len();
    AllocationResult::from_weights(input, AllocationMethod::EqualWeight, &vec![1.0 / n as f64; n])
}

/// Run one allocation method.
pub fn optimize(
    input: &OptimizationInput,
    method: AllocationMethod,
) -> Result<AllocationResult, OptimizationError> {
    if method != AllocationMethod::EqualWeight {
        input.cov.cholesky()?;
    }
    let n = input.len();
    let raw = match method {
        AllocationMethod::EqualWeight => vec![1.0 / n as f64; n],
        AllocationMethod::MaxSharpe => {
            solver::max_sharpe(&input.cov, &input.mu, input.risk_free_rate)?
        }
        AllocationMethod::MinVariance => solver::min_quadratic(&input.cov, &vec![0.0; n])?,
        AllocationMethod::RiskParity => solver::risk_parity(&input.cov)?,
    };
    let result = AllocationResult::from_weights(input, method, &raw);
    debug!(
        method = %method,
        expected_return = result.expected_return,
        volatility = result.volatility,
        sharpe = result.sharpe,
        "allocation solved"
    );
    Ok(result)
}

/// Run `method`, falling back to a degraded equal-weight allocation on
/// failure. The error, if any, is returned alongside.
pub fn optimize_or_equal_weight(
    input: &OptimizationInput,
    method: AllocationMethod,
) -> (AllocationResult, Option<OptimizationError>) {
    match optimize(input, method) {
        Ok(result) => (result, None),
        Err(e) => {
            warn!(method = %method, error = %e, "optimization failed, using equal weights");
            let mut fallback = equal_weight(input);
            fallback.degraded = true;
            (fallback, Some(e))
        }
    }
}

/// Per-asset share of portfolio variance: wᵢ·(Σw)ᵢ / wᵀΣw.
pub fn risk_contributions(input: &OptimizationInput, weights: &[f64]) -> Vec<f64> {
    let sw = input.cov.mul_vec(weights);
    let total: f64 = weights.iter().zip(&sw).map(|(w, s)| w * s).sum();
    if total <= 0.0 {
        return vec![0.0; weights.len()];
    }
    weights.iter().zip(&sw).map(|(w, s)| w * s / total).collect()
}

/// Per-period portfolio returns for fixed weights over aligned series.
pub fn portfolio_returns(weights: &[f64], returns: &[Vec<f64>]) -> Vec<f64> {
    let len = returns.iter().map(Vec::len).min().unwrap_or(0);
    (0..len)
        .map(|t| weights.iter().zip(returns).map(|(w, r)| w * r[t]).sum())
        .collect()
}

/// Every method side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSummary {
    pub results: BTreeMap<AllocationMethod, AllocationResult>,
    pub errors: BTreeMap<AllocationMethod, String>,
    /// Method with the highest Sharpe among the successful results.
    pub best_sharpe: Option<AllocationMethod>,
}

pub fn summarize(input: &OptimizationInput) -> OptimizationSummary {
    let mut results = BTreeMap::new();
    let mut errors = BTreeMap::new();
    for method in AllocationMethod::ALL {
        match optimize(input, method) {
            Ok(r) => {
                results.insert(method, r);
            }
            Err(e) => {
                errors.insert(method, e.to_string());
            }
        }
    }
    let best_sharpe = results
        .iter()
        .max_by(|a, b| a.1.sharpe.total_cmp(&b.1.sharpe))
        .map(|(m, _)| *m);
    OptimizationSummary {
        results,
        errors,
        best_sharpe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("A{i}")).collect()
    }

    fn two_asset() -> OptimizationInput {
        OptimizationInput::new(
            names(2),
            vec![0.12, 0.08],
            Matrix::diagonal(&[0.04, 0.01]).unwrap(),
            0.02,
        )
        .unwrap()
    }

    #[test]
    fn every_method_sums_to_one() {
        let input = two_asset();
        for method in AllocationMethod::ALL {
            let r = optimize(&input, method).unwrap();
            let total: f64 = r.weights.values().sum();
            assert!((total - 1.0).abs() < 1e-9, "{method}");
            assert!(r.weights.values().all(|w| *w >= 0.0));
            assert_eq!(r.method, method);
            assert!(!r.degraded);
        }
    }

    #[test]
    fn min_variance_and_risk_parity_weights() {
        let input = two_asset();
        let mv = optimize(&input, AllocationMethod::MinVariance).unwrap();
        assert!((mv.weight("A0") - 0.2).abs() < 1e-6);
        assert!((mv.weight("A1") - 0.8).abs() < 1e-6);
        let rp = optimize(&input, AllocationMethod::RiskParity).unwrap();
        assert!((rp.weight("A0") - 1.0 / 3.0).abs() < 1e-6);
        assert!((rp.weight("A1") - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn singular_covariance_falls_back_to_equal_weight() {
        let input = OptimizationInput::new(
            names(2),
            vec![0.10, 0.05],
            Matrix::from_rows(&[vec![0.04, 0.04], vec![0.04, 0.04]]).unwrap(),
            0.02,
        )
        .unwrap();
        assert!(matches!(
            optimize(&input, AllocationMethod::MaxSharpe),
            Err(OptimizationError::SingularCovariance { .. })
        ));
        let (result, err) = optimize_or_equal_weight(&input, AllocationMethod::MinVariance);
        assert!(matches!(err, Some(OptimizationError::SingularCovariance { .. })));
        assert!(result.degraded);
        assert_eq!(result.method, AllocationMethod::EqualWeight);
        assert_eq!(result.weight("A0"), 0.5);
        assert_eq!(result.weight("A1"), 0.5);
    }

    #[test]
    fn input_validation() {
        let cov = Matrix::diagonal(&[0.04, 0.01]).unwrap();
        assert!(matches!(
            OptimizationInput::new(names(2), vec![0.1], cov.clone(), 0.0),
            Err(OptimizationError::DimensionMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(
            OptimizationInput::new(names(2), vec![0.1, f64::NAN], cov.clone(), 0.0),
            Err(OptimizationError::NonFinite(_))
        ));
        assert!(matches!(
            OptimizationInput::new(vec![], vec![], cov, 0.0),
            Err(OptimizationError::NoAssets)
        ));
    }

    #[test]
    fn from_returns_annualizes() {
        let a: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 0.01 } else { -0.005 }).collect();
        let b: Vec<f64> = (0..100).map(|i| if i % 3 == 0 { 0.004 } else { 0.001 }).collect();
        let input = OptimizationInput::from_returns(names(2), &[a.clone(), b], 252, 0.0).unwrap();
        assert!((input.expected_returns()[0] - mean(&a) * 252.0).abs() < 1e-12);
        assert!((input.covariance().get(0, 0) - covariance(&a, &a) * 252.0).abs() < 1e-12);
    }

    #[test]
    fn ragged_returns_are_rejected() {
        assert!(matches!(
            OptimizationInput::from_returns(names(2), &[vec![0.0; 5], vec![0.0; 4]], 252, 0.0),
            Err(OptimizationError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn contributions_sum_to_one() {
        let input = two_asset();
        let rc = risk_contributions(&input, &[0.5, 0.5]);
        assert!((rc.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((rc[0] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn summary_picks_max_sharpe() {
        let s = summarize(&two_asset());
        assert_eq!(s.results.len(), 4);
        assert!(s.errors.is_empty());
        assert_eq!(s.best_sharpe, Some(AllocationMethod::MaxSharpe));
    }

    #[test]
    fn weighted_return_series() {
        let r = portfolio_returns(&[0.25, 0.75], &[vec![0.04, -0.04], vec![0.0, 0.04]]);
        assert!((r[0] - 0.01).abs() < 1e-15);
        assert!((r[1] - 0.02).abs() < 1e-15);
    }
}
