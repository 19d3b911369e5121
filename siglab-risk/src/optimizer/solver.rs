//! Long-only solvers over the probability simplex {w ≥ 0, Σw = 1}.
//!
//! - `min_quadratic`: wᵀΣw + cᵀw by accelerated projected gradient (FISTA)
//!   with adaptive restart.
//! - `max_sharpe`: projected gradient ascent on the Sharpe ratio with
//!   Armijo backtracking.
//! - `risk_parity`: cyclical coordinate descent on the log-barrier
//!   formulation ½yᵀΣy − b·Σ ln yᵢ, normalized afterwards.
//!
//! All solvers expect a positive definite covariance; callers check that
//! with a Cholesky factorization first.

use super::matrix::Matrix;
use super::OptimizationError;

const MAX_ITER: usize = 50_000;
const STEP_TOL: f64 = 1e-13;

/// Euclidean projection onto the simplex (sort-based, O(n log n)).
pub fn project_simplex(v: &[f64]) -> Vec<f64> {
    let mut u = v.to_vec();
    u.sort_by(|a, b| b.total_cmp(a));
    let mut cumsum = 0.0;
    let mut theta = 0.0;
    for (j, uj) in u.iter().enumerate() {
        cumsum += uj;
        let t = (cumsum - 1.0) / (j + 1) as f64;
        if uj - t > 0.0 {
            theta = t;
        }
    }
    v.iter().map(|x| (x - theta).max(0.0)).collect()
}

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Minimize wᵀΣw + linᵀw over the simplex.
pub fn min_quadratic(cov: &Matrix, lin: &[f64]) -> Result<Vec<f64>, OptimizationError> {
    let n = cov.n();
    let lipschitz = (2.0 * cov.gershgorin_bound()).max(1e-12);
    let objective = |w: &[f64]| cov.quad_form(w) + dot(lin, w);

    let mut x = vec![1.0 / n as f64; n];
    let mut y = x.clone();
    let mut t = 1.0_f64;
    let mut fx = objective(&x);

    for _ in 0..MAX_ITER {
        let grad: Vec<f64> = cov
            .mul_vec(&y)
            .iter()
            .zip(lin)
            .map(|(g, c)| 2.0 * g + c)
            .collect();
        let step: Vec<f64> = y.iter().zip(&grad).map(|(yi, gi)| yi - gi / lipschitz).collect();
        let x_next = project_simplex(&step);
        let f_next = objective(&x_next);

        if max_abs_diff(&x_next, &x) < STEP_TOL {
            return Ok(x_next);
        }

        if f_next > fx {
            // Momentum overshot: restart from the last iterate.
            t = 1.0;
            y.clone_from(&x);
            continue;
        }

        let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
        let momentum = (t - 1.0) / t_next;
        y = x_next
            .iter()
            .zip(&x)
            .map(|(a, b)| a + momentum * (a - b))
            .collect();
        x = x_next;
        fx = f_next;
        t = t_next;
    }
    Err(OptimizationError::NotConverged { iterations: MAX_ITER })
}

fn sharpe_of(cov: &Matrix, excess: &[f64], w: &[f64]) -> f64 {
    dot(excess, w) / cov.quad_form(w).sqrt()
}

/// Maximize (μᵀw − r_f)/√(wᵀΣw) over the simplex.
///
/// With Σw = 1 the numerator is (μ − r_f)ᵀw. At least one asset must have
/// an expected return above `risk_free`.
pub fn max_sharpe(cov: &Matrix, mu: &[f64], risk_free: f64) -> Result<Vec<f64>, OptimizationError> {
    let excess: Vec<f64> = mu.iter().map(|m| m - risk_free).collect();
    if excess.iter().all(|e| *e <= 0.0) {
        return Err(OptimizationError::Infeasible(
            "no asset has an expected return above the risk-free rate".into(),
        ));
    }

    // Start from the diagonal-covariance tangency portfolio.
    let diag = cov.diag();
    let seed: Vec<f64> = excess
        .iter()
        .zip(&diag)
        .map(|(e, d)| e.max(0.0) / d)
        .collect();
    let total: f64 = seed.iter().sum();
    let mut w: Vec<f64> = seed.iter().map(|s| s / total).collect();
    let mut sharpe = sharpe_of(cov, &excess, &w);
    let mut step = 1.0;

    for _ in 0..MAX_ITER {
        let sigma_w = cov.mul_vec(&w);
        let var = dot(&w, &sigma_w);
        let vol = var.sqrt();
        let ret = dot(&excess, &w);
        let grad: Vec<f64> = excess
            .iter()
            .zip(&sigma_w)
            .map(|(e, s)| e / vol - ret * s / (var * vol))
            .collect();

        let mut accepted = None;
        let mut s = step;
        while s > 1e-20 {
            let candidate: Vec<f64> = project_simplex(
                &w.iter().zip(&grad).map(|(wi, gi)| wi + s * gi).collect::<Vec<_>>(),
            );
            let direction: Vec<f64> = candidate.iter().zip(&w).map(|(c, x)| c - x).collect();
            let value = sharpe_of(cov, &excess, &candidate);
            if value >= sharpe + 1e-4 * dot(&grad, &direction) {
                accepted = Some((candidate, value, s));
                break;
            }
            s *= 0.5;
        }

        let Some((next, value, used)) = accepted else {
            return Ok(w);
        };
        let moved = max_abs_diff(&next, &w);
        w = next;
        sharpe = value;
        step = (used * 2.0).min(1e6);
        if moved < STEP_TOL {
            return Ok(w);
        }
    }
    Err(OptimizationError::NotConverged { iterations: MAX_ITER })
}

/// Equal risk contribution weights: wᵢ·(Σw)ᵢ identical for every i.
pub fn risk_parity(cov: &Matrix) -> Result<Vec<f64>, OptimizationError> {
    let n = cov.n();
    let budget = 1.0 / n as f64;
    let diag = cov.diag();
    let mut y: Vec<f64> = diag.iter().map(|d| (budget / d).sqrt()).collect();

    for _ in 0..MAX_ITER {
        let mut largest_change = 0.0_f64;
        for i in 0..n {
            let c: f64 = (0..n)
                .filter(|&j| j != i)
                .map(|j| cov.get(i, j) * y[j])
                .sum();
            let next = (-c + (c * c + 4.0 * diag[i] * budget).sqrt()) / (2.0 * diag[i]);
            largest_change = largest_change.max((next - y[i]).abs());
            y[i] = next;
        }
        let scale = y.iter().copied().fold(0.0, f64::max);
        if largest_change <= 1e-12 * scale {
            let total: f64 = y.iter().sum();
            return Ok(y.iter().map(|v| v / total).collect());
        }
    }
    Err(OptimizationError::NotConverged { iterations: MAX_ITER })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn projection_lands_on_simplex() {
        assert_close(&project_simplex(&[0.5, 0.5]), &[0.5, 0.5], 1e-15);
        assert_close(&project_simplex(&[2.0, 0.0]), &[1.0, 0.0], 1e-15);
        assert_close(&project_simplex(&[0.2, 0.2, 0.2]), &[1.0 / 3.0; 3], 1e-15);
        let p = project_simplex(&[-3.0, 0.4, 1.1]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn min_variance_on_diagonal() {
        let cov = Matrix::diagonal(&[0.04, 0.01]).unwrap();
        let w = min_quadratic(&cov, &[0.0, 0.0]).unwrap();
        assert_close(&w, &[0.2, 0.8], 1e-6);
    }

    #[test]
    fn linear_term_pushes_to_a_corner() {
        let cov = Matrix::diagonal(&[0.04, 0.01]).unwrap();
        let w = min_quadratic(&cov, &[-100.0, 0.0]).unwrap();
        assert_close(&w, &[1.0, 0.0], 1e-9);
    }

    #[test]
    fn tangency_on_diagonal() {
        let cov = Matrix::diagonal(&[0.04, 0.01]).unwrap();
        let w = max_sharpe(&cov, &[0.12, 0.08], 0.02).unwrap();
        assert_close(&w, &[2.5 / 8.5, 6.0 / 8.5], 1e-4);
    }

    #[test]
    fn tangency_drops_assets_below_the_risk_free_rate() {
        let cov = Matrix::diagonal(&[0.04, 0.01, 0.02]).unwrap();
        let w = max_sharpe(&cov, &[0.12, 0.08, 0.01], 0.02).unwrap();
        assert!(w[2] < 1e-9);
    }

    #[test]
    fn tangency_requires_positive_excess() {
        let cov = Matrix::diagonal(&[0.04, 0.01]).unwrap();
        assert!(matches!(
            max_sharpe(&cov, &[0.01, 0.0], 0.02),
            Err(OptimizationError::Infeasible(_))
        ));
    }

    #[test]
    fn risk_parity_on_diagonal() {
        let cov = Matrix::diagonal(&[0.04, 0.01]).unwrap();
        let w = risk_parity(&cov).unwrap();
        assert_close(&w, &[1.0 / 3.0, 2.0 / 3.0], 1e-9);
    }

    #[test]
    fn risk_parity_equalizes_contributions_with_correlation() {
        let cov = Matrix::from_rows(&[
            vec![0.04, 0.006, -0.002],
            vec![0.006, 0.09, 0.01],
            vec![-0.002, 0.01, 0.0225],
        ])
        .unwrap();
        let w = risk_parity(&cov).unwrap();
        let sw = cov.mul_vec(&w);
        let rc: Vec<f64> = w.iter().zip(&sw).map(|(a, b)| a * b).collect();
        assert!(rc.iter().all(|r| (r - rc[0]).abs() < 1e-10), "{rc:?}");
    }
}
