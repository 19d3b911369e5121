//! Dense square matrix for covariance work. Row-major, small n.

use serde::{Deserialize, Serialize};

use super::OptimizationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    n: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Build from rows; every row must have `rows.len()` finite entries.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, OptimizationError> {
        let n = rows.len();
        if n == 0 {
            return Err(OptimizationError::NoAssets);
        }
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            if row.len() != n {
                return Err(OptimizationError::DimensionMismatch {
                    expected: n,
                    found: row.len(),
                });
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(OptimizationError::NonFinite("covariance"));
            }
            data.extend_from_slice(row);
        }
        Ok(Self { n, data })
    }

    pub fn diagonal(values: &[f64]) -> Result<Self, OptimizationError> {
        let rows: Vec<Vec<f64>> = (0..values.len())
            .map(|i| {
                let mut row = vec![0.0; values.len()];
                row[i] = values[i];
                row
            })
            .collect();
        Self::from_rows(&rows)
    }

    pub fn n(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    pub fn diag(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.get(i, i)).collect()
    }

    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        (0..self.n)
            .map(|i| self.row(i).iter().zip(v).map(|(a, b)| a * b).sum())
            .collect()
    }

    /// vᵀ M v
    pub fn quad_form(&self, v: &[f64]) -> f64 {
        self.mul_vec(v).iter().zip(v).map(|(a, b)| a * b).sum()
    }

    /// Gershgorin upper bound on the largest eigenvalue.
    pub fn gershgorin_bound(&self) -> f64 {
        (0..self.n)
            .map(|i| self.row(i).iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max)
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            n: self.n,
            data: self.data.iter().map(|v| v * factor).collect(),
        }
    }

    /// Lower-triangular Cholesky factor.
    ///
    /// A pivot at or below `1e-12` times the largest diagonal entry marks
    /// the matrix as singular (or not positive definite).
    pub fn cholesky(&self) -> Result<Vec<f64>, OptimizationError> {
        let n = self.n;
        let scale = self.diag().into_iter().fold(0.0, f64::max).max(f64::MIN_POSITIVE);
        let mut l = vec![0.0; n * n];
        for j in 0..n {
            let mut pivot = self.get(j, j);
            for k in 0..j {
                pivot -= l[j * n + k] * l[j * n + k];
            }
            if pivot <= 1e-12 * scale {
                return Err(OptimizationError::SingularCovariance { index: j });
            }
            let d = pivot.sqrt();
            l[j * n + j] = d;
            for i in (j + 1)..n {
                let mut s = self.get(i, j);
                for k in 0..j {
                    s -= l[i * n + k] * l[j * n + k];
                }
                l[i * n + j] = s / d;
            }
        }
        Ok(l)
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        (0..self.n).all(|i| (0..i).all(|j| (self.get(i, j) - self.get(j, i)).abs() <= tol))
    }
}
