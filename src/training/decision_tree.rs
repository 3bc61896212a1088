//! CART decision tree, the building block of the random forest

use super::estimator::{check_fit_input, check_predict_input, n_classes};
use crate::error::Result;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Decision tree node. Children are indices into the tree's node list, so
/// a serialized tree nests no deeper than one node whatever its depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Samples with `x[feature_idx] <= threshold` go left; NaN goes right
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

impl Criterion {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "gini" => Some(Criterion::Gini),
            "entropy" | "log_loss" => Some(Criterion::Entropy),
            "mse" | "squared_error" => Some(Criterion::MSE),
            _ => None,
        }
    }

    pub fn is_classification(&self) -> bool {
        !matches!(self, Criterion::MSE)
    }
}

/// Running label statistics for one side of a candidate split
#[derive(Clone)]
enum Stats {
    Classes(Vec<usize>),
    Moments { sum: f64, sq_sum: f64 },
}

impl Stats {
    fn empty(n_classes: Option<usize>) -> Self {
        match n_classes {
            Some(k) => Stats::Classes(vec![0; k]),
            None => Stats::Moments { sum: 0.0, sq_sum: 0.0 },
        }
    }

    fn add(&mut self, yi: f64, sign: f64) {
        match self {
            Stats::Classes(counts) => {
                let c = &mut counts[yi as usize];
                if sign > 0.0 {
                    *c += 1;
                } else {
                    *c -= 1;
                }
            }
            Stats::Moments { sum, sq_sum } => {
                *sum += sign * yi;
                *sq_sum += sign * yi * yi;
            }
        }
    }

    fn impurity(&self, count: usize, criterion: Criterion) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let n = count as f64;
        match self {
            Stats::Classes(counts) => {
                let probs = counts.iter().filter(|&&c| c > 0).map(|&c| c as f64 / n);
                match criterion {
                    Criterion::Entropy => probs.map(|p| -p * p.log2()).sum(),
                    _ => 1.0 - probs.map(|p| p * p).sum::<f64>(),
                }
            }
            Stats::Moments { sum, sq_sum } => {
                let mean = sum / n;
                (sq_sum / n - mean * mean).max(0.0)
            }
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Root first; empty until fitted
    nodes: Vec<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn at random per split; `None` considers all
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub random_state: u64,
    n_features: usize,
    n_classes: usize,
}

impl DecisionTree {
    pub fn new_classifier() -> Self {
        Self::with_criterion_default(Criterion::Gini)
    }

    pub fn new_regressor() -> Self {
        Self::with_criterion_default(Criterion::MSE)
    }

    fn with_criterion_default(criterion: Criterion) -> Self {
        Self {
            nodes: Vec::new(),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion,
            random_state: 0,
            n_features: 0,
            n_classes: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn is_classifier(&self) -> bool {
        self.criterion.is_classification()
    }

    pub fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.fit_rows(x, y, (0..x.nrows()).collect())
    }

    /// Fit on a subset of rows (repeats allowed, as in a bootstrap sample)
    pub fn fit_rows(&mut self, x: &Array2<f64>, y: &Array1<f64>, rows: Vec<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        self.n_features = x.ncols();
        self.n_classes = if self.is_classifier() { n_classes(y)? } else { 0 };

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut nodes = Vec::new();
        self.build(x, y, rows, 0, &mut rng, &mut nodes);
        self.nodes = nodes;
        Ok(())
    }

    fn class_slots(&self) -> Option<usize> {
        self.is_classifier().then_some(self.n_classes)
    }

    fn build(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
        nodes: &mut Vec<TreeNode>,
    ) -> usize {
        let n_samples = rows.len();
        let mut stats = Stats::empty(self.class_slots());
        for &i in &rows {
            stats.add(y[i], 1.0);
        }
        let impurity = stats.impurity(n_samples, self.criterion);

        let stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= f64::EPSILON;

        let split = if stop {
            None
        } else {
            self.best_split(x, y, &rows, &stats, impurity, rng)
        };

        let index = nodes.len();
        nodes.push(TreeNode::Leaf {
            value: self.leaf_value(&stats, n_samples),
            n_samples,
        });

        if let Some((feature_idx, threshold)) = split {
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                rows.into_iter().partition(|&i| x[[i, feature_idx]] <= threshold);
            let left = self.build(x, y, left_rows, depth + 1, rng, nodes);
            let right = self.build(x, y, right_rows, depth + 1, rng, nodes);
            nodes[index] = TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                n_samples,
            };
        }
        index
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut features = rand::seq::index::sample(rng, self.n_features, k.max(1)).into_vec();
                features.sort_unstable();
                features
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        total: &Stats,
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<(usize, f64)> {
        let n = rows.len();
        let mut best: Option<(usize, f64)> = None;
        let mut best_gain = 0.0;

        for feature in self.candidate_features(rng) {
            let mut order = rows.to_vec();
            order.sort_by(|&a, &b| nan_last(x[[a, feature]], x[[b, feature]]));

            let mut left = Stats::empty(self.class_slots());
            let mut right = total.clone();

            for pos in 0..n - 1 {
                let i = order[pos];
                left.add(y[i], 1.0);
                right.add(y[i], -1.0);

                let (lo, hi) = (x[[i, feature]], x[[order[pos + 1], feature]]);
                if lo.is_nan() || hi.is_nan() || lo == hi {
                    continue;
                }
                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }

                let weighted = (n_left as f64 * left.impurity(n_left, self.criterion)
                    + n_right as f64 * right.impurity(n_right, self.criterion))
                    / n as f64;
                let gain = parent_impurity - weighted;
                if gain > best_gain + 1e-12 {
                    best_gain = gain;
                    let mid = lo / 2.0 + hi / 2.0;
                    best = Some((feature, if mid >= hi { lo } else { mid }));
                }
            }
        }
        best
    }

    fn leaf_value(&self, stats: &Stats, n_samples: usize) -> f64 {
        match stats {
            Stats::Classes(counts) => counts
                .iter()
                .enumerate()
                .fold((0usize, 0usize), |best, (class, &count)| {
                    if count > best.1 {
                        (class, count)
                    } else {
                        best
                    }
                })
                .0 as f64,
            Stats::Moments { sum, .. } => sum / n_samples.max(1) as f64,
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(crate::error::GridfitError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;
        Ok(Array1::from_shape_fn(x.nrows(), |i| predict_row(&self.nodes, x, i)))
    }

    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((index, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let TreeNode::Split { left, right, .. } = &self.nodes[index] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        deepest
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }
}

fn nan_last(a: f64, b: f64) -> Ordering {
    a.is_nan().cmp(&b.is_nan()).then(a.total_cmp(&b))
}

fn predict_row(nodes: &[TreeNode], x: &Array2<f64>, row: usize) -> f64 {
    let mut index = 0;
    loop {
        match &nodes[index] {
            TreeNode::Leaf { value, .. } => return *value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                index = if x[[row, *feature_idx]] <= *threshold {
                    *left
                } else {
                    *right
                };
            }
        }
    }
}
