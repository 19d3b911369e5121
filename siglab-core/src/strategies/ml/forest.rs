//! Bagged ensemble of classification trees.
//!
//! Each tree sees a bootstrap sample of the training rows and a random
//! subset of `sqrt(n_features)` features at every split. Tree `i` draws from
//! its own RNG stream `("forest", i)`, so the fitted forest is identical no
//! matter how rayon schedules the trees.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::rng::RngHierarchy;

use super::tree::{FitData, RegressionTree, TreeParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Fit on 0/1 labels. Returns the forest and normalized feature importances.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        n_trees: usize,
        max_depth: usize,
        rng: &RngHierarchy,
    ) -> (Self, Vec<f64>) {
        let n_features = x.first().map_or(0, Vec::len);
        let params = TreeParams {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: Some(((n_features as f64).sqrt().round() as usize).max(1)),
        };
        let data = FitData {
            x,
            target: y,
            hessian: None,
        };

        let fitted: Vec<(RegressionTree, Vec<f64>)> = (0..n_trees)
            .into_par_iter()
            .map(|i| {
                let mut tree_rng = rng.rng_for("forest", i as u64);
                let mut rows: Vec<usize> =
                    (0..x.len()).map(|_| tree_rng.gen_range(0..x.len())).collect();
                let mut importances = vec![0.0; n_features];
                let tree =
                    RegressionTree::fit(&data, &mut rows, &params, &mut tree_rng, &mut importances);
                normalize(&mut importances);
                (tree, importances)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        for (_, imp) in &fitted {
            for (acc, v) in importances.iter_mut().zip(imp) {
                *acc += v;
            }
        }
        normalize(&mut importances);
        let trees = fitted.into_iter().map(|(t, _)| t).collect();
        (Self { trees }, importances)
    }

    /// Mean of the trees' leaf probabilities.
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        (sum / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

pub(crate) fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}
