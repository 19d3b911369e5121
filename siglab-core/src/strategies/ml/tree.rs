//! Regression tree (CART) shared by the forest and the boosted ensemble.
//!
//! Splits maximize the reduction of squared error. On 0/1 targets this is
//! the same criterion as Gini impurity, so the forest's trees are ordinary
//! classification trees whose leaves hold the fraction of positive labels.
//! Boosting fits the same trees to log-loss gradients and uses a Newton step
//! (`sum(gradient) / sum(hessian)`) as the leaf value.
//!
//! # Layout
//!
//! Nodes are stored flat in pre-order. A node with `feature == -1` is a leaf
//! and returns `value`. Otherwise compare `features[feature]` to `threshold`:
//! `<= threshold` or `NaN` goes to `left`, everything else to `right`.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Feature index to split on (-1 for leaf nodes).
    pub feature: i32,
    pub threshold: f64,
    pub left: i32,
    pub right: i32,
    /// Prediction at this node (used when it is a leaf).
    pub value: f64,
}

impl TreeNode {
    fn leaf(value: f64) -> Self {
        Self {
            feature: -1,
            threshold: 0.0,
            left: -1,
            right: -1,
            value,
        }
    }

    fn is_leaf(&self) -> bool {
        self.feature < 0
    }
}

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all of them.
    pub max_features: Option<usize>,
}

impl TreeParams {
    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

/// Training inputs for one tree.
pub(crate) struct FitData<'a> {
    pub x: &'a [Vec<f64>],
    pub target: &'a [f64],
    /// Per-row hessians for Newton leaf values; `None` averages the target.
    pub hessian: Option<&'a [f64]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Grow a tree on `rows` (indices into `data`, repeats allowed).
    ///
    /// Split gains are added to `importances[feature]`.
    pub(crate) fn fit(
        data: &FitData<'_>,
        rows: &mut [usize],
        params: &TreeParams,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, rows, 0, params, rng, importances);
        tree
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };
            if node.is_leaf() {
                return node.value;
            }
            let v = features.get(node.feature as usize).copied().unwrap_or(f64::NAN);
            let next = if v.is_nan() || v <= node.threshold {
                node.left
            } else {
                node.right
            };
            idx = next as usize;
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(n) if !n.is_leaf() => {
                    1 + walk(nodes, n.left as usize).max(walk(nodes, n.right as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    fn grow(
        &mut self,
        data: &FitData<'_>,
        rows: &mut [usize],
        depth: usize,
        params: &TreeParams,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> i32 {
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::leaf(leaf_value(data, rows)));

        if depth >= params.max_depth || rows.len() < params.min_samples_split || is_pure(data, rows) {
            return idx as i32;
        }
        let Some(split) = best_split(data, rows, params, rng) else {
            return idx as i32;
        };

        let mid = partition(rows, |r| data.x[r][split.feature] <= split.threshold);
        importances[split.feature] += split.gain;

        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(data, left_rows, depth + 1, params, rng, importances);
        let right = self.grow(data, right_rows, depth + 1, params, rng, importances);

        let node = &mut self.nodes[idx];
        node.feature = split.feature as i32;
        node.threshold = split.threshold;
        node.left = left;
        node.right = right;
        idx as i32
    }
}

fn leaf_value(data: &FitData<'_>, rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let sum: f64 = rows.iter().map(|&r| data.target[r]).sum();
    match data.hessian {
        Some(h) => {
            let hsum: f64 = rows.iter().map(|&r| h[r]).sum();
            if hsum < 1e-12 {
                0.0
            } else {
                sum / hsum
            }
        }
        None => sum / rows.len() as f64,
    }
}

fn is_pure(data: &FitData<'_>, rows: &[usize]) -> bool {
    let first = data.target[rows[0]];
    rows.iter().all(|&r| data.target[r] == first)
}

fn best_split(
    data: &FitData<'_>,
    rows: &[usize],
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<Split> {
    let n_features = data.x.first().map_or(0, Vec::len);
    if n_features == 0 {
        return None;
    }
    let candidates: Vec<usize> = match params.max_features {
        Some(k) if k < n_features => sample(rng, n_features, k.max(1)).into_vec(),
        _ => (0..n_features).collect(),
    };

    let n = rows.len();
    let total: f64 = rows.iter().map(|&r| data.target[r]).sum();
    let parent_score = total * total / n as f64;
    let min_leaf = params.min_samples_leaf.max(1);

    let mut best: Option<Split> = None;
    let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n);
    for feature in candidates {
        sorted.clear();
        sorted.extend(rows.iter().map(|&r| (data.x[r][feature], data.target[r])));
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0;
        for i in 1..n {
            left_sum += sorted[i - 1].1;
            if i < min_leaf || n - i < min_leaf {
                continue;
            }
            let (lo, hi) = (sorted[i - 1].0, sorted[i].0);
            if lo >= hi {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / i as f64 + right_sum * right_sum / (n - i) as f64
                - parent_score;
            if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some(Split {
                    feature,
                    threshold,
                    gain,
                });
            }
        }
    }
    best
}

/// Reorder `rows` so that rows satisfying `goes_left` come first; returns the split point.
fn partition(rows: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let (left, right): (Vec<usize>, Vec<usize>) = rows.iter().partition(|&&r| goes_left(r));
    let mid = left.len();
    rows[..mid].copy_from_slice(&left);
    rows[mid..].copy_from_slice(&right);
    mid
}
