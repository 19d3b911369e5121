//! Gradient-boosted trees for binary log-loss.
//!
//! F0 = log-odds of the base rate. Each stage fits a tree to the residuals
//! `y - p` and sets leaf values by one Newton step, `sum(r) / sum(p(1 - p))`.
//! F += learning_rate * tree(x). p = sigmoid(F).

use serde::{Deserialize, Serialize};

use crate::rng::RngHierarchy;

use super::forest::normalize;
use super::tree::{FitData, RegressionTree, TreeParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    init_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl GradientBoosting {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        n_stages: usize,
        max_depth: usize,
        learning_rate: f64,
        rng: &RngHierarchy,
    ) -> (Self, Vec<f64>) {
        let n = x.len();
        let n_features = x.first().map_or(0, Vec::len);
        let base_rate = (y.iter().sum::<f64>() / n.max(1) as f64).clamp(1e-6, 1.0 - 1e-6);
        let init_score = (base_rate / (1.0 - base_rate)).ln();

        let params = TreeParams::with_depth(max_depth);
        // Every feature is a candidate, so the stream is only drawn from if
        // the params ever subsample features.
        let mut stage_rng = rng.rng_for("boost", 0);
        let mut scores = vec![init_score; n];
        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(n_stages);

        for _ in 0..n_stages {
            let probs: Vec<f64> = scores.iter().map(|&f| sigmoid(f)).collect();
            let residuals: Vec<f64> = y.iter().zip(&probs).map(|(yi, p)| yi - p).collect();
            let hessians: Vec<f64> = probs.iter().map(|p| p * (1.0 - p)).collect();
            let data = FitData {
                x,
                target: &residuals,
                hessian: Some(&hessians),
            };
            let mut rows: Vec<usize> = (0..n).collect();
            let tree = RegressionTree::fit(&data, &mut rows, &params, &mut stage_rng, &mut importances);
            for (score, row) in scores.iter_mut().zip(x) {
                *score += learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        normalize(&mut importances);
        (
            Self {
                init_score,
                learning_rate,
                trees,
            },
            importances,
        )
    }

    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        let raw = self.init_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(features)).sum::<f64>();
        sigmoid(raw)
    }

    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }
}
