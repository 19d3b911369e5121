//! Efficient frontier by repeated minimum-variance solves.
//!
//! For each target return τ on an even grid between the smallest and the
//! largest expected return, bisect the multiplier ν of
//! min wᵀΣw − ν·μᵀw until μᵀw hits τ. The achieved return is monotone in
//! ν, so bisection is enough. Targets that cannot be met within 1e-6 are
//! skipped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::solver::min_quadratic;
use super::{clean_weights, OptimizationError, OptimizationInput};

const TARGET_TOL: f64 = 1e-6;
const BISECTION_STEPS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub target_return: f64,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub weights: BTreeMap<String, f64>,
}

/// Up to `points` (risk, return) pairs ordered by target return.
pub fn efficient_frontier(
    input: &OptimizationInput,
    points: usize,
) -> Result<Vec<FrontierPoint>, OptimizationError> {
    input.cov.cholesky()?;
    let mu = &input.mu;
    let lo = mu.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if points == 0 {
        return Ok(Vec::new());
    }
    if hi - lo < 1e-12 || points == 1 {
        let w = min_quadratic(&input.cov, &vec![0.0; input.len()])?;
        return Ok(vec![point(input, input.portfolio_return(&w), &w)]);
    }

    // Large enough that ±bound pins the solution to the extreme returns.
    let bound = 1e6 * input.cov.gershgorin_bound().max(1e-12) / (hi - lo);
    let mut frontier = Vec::with_capacity(points);
    for k in 0..points {
        let target = lo + (hi - lo) * k as f64 / (points - 1) as f64;
        match solve_for_target(input, target, bound)? {
            Some(w) => frontier.push(point(input, target, &w)),
            None => debug!(target, "frontier target not reachable, skipped"),
        }
    }
    Ok(frontier)
}

fn solve_for_target(
    input: &OptimizationInput,
    target: f64,
    bound: f64,
) -> Result<Option<Vec<f64>>, OptimizationError> {
    let solve = |nu: f64| {
        let lin: Vec<f64> = input.mu.iter().map(|m| -nu * m).collect();
        min_quadratic(&input.cov, &lin)
    };

    let (mut lo, mut hi) = (-bound, bound);
    let mut best: Option<(f64, Vec<f64>)> = None;
    for _ in 0..BISECTION_STEPS {
        let nu = 0.5 * (lo + hi);
        let w = solve(nu)?;
        let achieved = input.portfolio_return(&w);
        let miss = (achieved - target).abs();
        if best.as_ref().map_or(true, |(m, _)| miss < *m) {
            best = Some((miss, w));
        }
        if miss < 1e-10 || hi - lo < 1e-12 * bound {
            break;
        }
        if achieved < target {
            lo = nu;
        } else {
            hi = nu;
        }
    }
    Ok(best.and_then(|(miss, w)| (miss <= TARGET_TOL).then_some(w)))
}

fn point(input: &OptimizationInput, target: f64, raw: &[f64]) -> FrontierPoint {
    let w = clean_weights(raw);
    FrontierPoint {
        target_return: target,
        expected_return: input.portfolio_return(&w),
        volatility: input.portfolio_volatility(&w),
        sharpe: input.sharpe(&w),
        weights: input.instruments.iter().cloned().zip(w.iter().copied()).collect(),
    }
}
