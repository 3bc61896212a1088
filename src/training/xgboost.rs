//! XGBoost-style gradient boosting with second-order approximation
//!
//! - Leaf weights: w* = -G / (H + lambda), soft-thresholded by alpha
//! - Split gain: 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)], kept when above gamma
//! - Squared error for regression, logistic loss for classification
//! - More than two classes are handled one-vs-rest, one booster per class
//!
//! Rows are read by index, so column-major input is scanned without a copy.

use super::estimator::{check_fit_input, check_predict_input, n_classes, unknown_param, Estimator};
use super::params::{float_above, positive_usize, ParamValue};
use crate::error::{GridfitError, Result};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Booster configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 0,
        }
    }
}

/// Children are indices into [`XGBTree::nodes`]
#[derive(Debug, Clone, Serialize, Deserialize)]
enum XGBNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One regression tree, root first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct XGBTree {
    nodes: Vec<XGBNode>,
}

impl XGBTree {
    fn predict(&self, x: &Array2<f64>, row: usize) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                XGBNode::Leaf { weight } => return *weight,
                XGBNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[[row, *feature]] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Objective {
    SquaredError,
    Logistic,
}

impl Objective {
    fn gradients(&self, raw: &Array1<f64>, y: &Array1<f64>) -> (Array1<f64>, Array1<f64>) {
        match self {
            Objective::SquaredError => (raw - y, Array1::ones(raw.len())),
            Objective::Logistic => {
                let probs = raw.mapv(sigmoid);
                let hess = probs.mapv(|p| (p * (1.0 - p)).max(1e-7));
                (&probs - y, hess)
            }
        }
    }

    fn base_score(&self, y: &Array1<f64>) -> f64 {
        match self {
            Objective::SquaredError => y.mean().unwrap_or(0.0),
            Objective::Logistic => {
                let p = y.mean().unwrap_or(0.5).clamp(1e-7, 1.0 - 1e-7);
                (p / (1.0 - p)).ln()
            }
        }
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// One additive ensemble of trees
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Booster {
    trees: Vec<XGBTree>,
    base_score: f64,
}

impl Booster {
    fn train(
        x: &Array2<f64>,
        y: &Array1<f64>,
        objective: Objective,
        config: &XGBoostConfig,
        seed: u64,
    ) -> Self {
        let (n_samples, n_features) = x.dim();
        let base_score = objective.base_score(y);
        let mut raw = Array1::from_elem(n_samples, base_score);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let (grad, hess) = objective.gradients(&raw, y);
            let rows = subsample(&mut rng, n_samples, config.subsample);
            let cols = subsample(&mut rng, n_features, config.colsample_bytree);

            let mut tree = XGBTree::default();
            build_tree(x, &grad, &hess, &rows, &cols, 0, config, &mut tree.nodes);
            for i in 0..n_samples {
                raw[i] += config.learning_rate * tree.predict(x, i);
            }
            trees.push(tree);
        }

        Self { trees, base_score }
    }

    fn raw_predict(&self, x: &Array2<f64>, learning_rate: f64) -> Array1<f64> {
        Array1::from_shape_fn(x.nrows(), |i| {
            self.base_score
                + learning_rate * self.trees.iter().map(|t| t.predict(x, i)).sum::<f64>()
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn build_tree(
    x: &Array2<f64>,
    grad: &Array1<f64>,
    hess: &Array1<f64>,
    rows: &[usize],
    features: &[usize],
    depth: usize,
    config: &XGBoostConfig,
    nodes: &mut Vec<XGBNode>,
) -> usize {
    let g_sum: f64 = rows.iter().map(|&i| grad[i]).sum();
    let h_sum: f64 = rows.iter().map(|&i| hess[i]).sum();
    let weight = leaf_weight(g_sum, h_sum, config.reg_lambda, config.reg_alpha);

    let index = nodes.len();
    nodes.push(XGBNode::Leaf { weight });
    if depth >= config.max_depth || rows.len() < 2 || h_sum < config.min_child_weight {
        return index;
    }

    let best = features
        .par_iter()
        .filter_map(|&f| best_split_for_feature(x, grad, hess, rows, f, config))
        .reduce_with(|a, b| if b.2 > a.2 || (b.2 == a.2 && b.0 < a.0) { b } else { a });

    if let Some((feature, threshold, gain)) = best {
        if gain <= config.gamma {
            return index;
        }
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&i| x[[i, feature]] <= threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            return index;
        }
        let left = build_tree(x, grad, hess, &left_rows, features, depth + 1, config, nodes);
        let right = build_tree(x, grad, hess, &right_rows, features, depth + 1, config, nodes);
        nodes[index] = XGBNode::Split {
            feature,
            threshold,
            left,
            right,
        };
    }
    index
}

fn leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    let g = if g_sum > alpha {
        g_sum - alpha
    } else if g_sum < -alpha {
        g_sum + alpha
    } else {
        return 0.0;
    };
    -g / (h_sum + lambda)
}

/// Exact greedy search; returns (feature, threshold, gain)
fn best_split_for_feature(
    x: &Array2<f64>,
    grad: &Array1<f64>,
    hess: &Array1<f64>,
    rows: &[usize],
    feature: usize,
    config: &XGBoostConfig,
) -> Option<(usize, f64, f64)> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|&a, &b| {
        let (va, vb) = (x[[a, feature]], x[[b, feature]]);
        va.is_nan().cmp(&vb.is_nan()).then(va.total_cmp(&vb))
    });

    let g_total: f64 = sorted.iter().map(|&i| grad[i]).sum();
    let h_total: f64 = sorted.iter().map(|&i| hess[i]).sum();
    let lambda = config.reg_lambda;
    let parent = g_total * g_total / (h_total + lambda);

    let (mut g_left, mut h_left) = (0.0, 0.0);
    let mut best: Option<(usize, f64, f64)> = None;

    for pos in 0..sorted.len() - 1 {
        let idx = sorted[pos];
        g_left += grad[idx];
        h_left += hess[idx];

        let (lo, hi) = (x[[idx, feature]], x[[sorted[pos + 1], feature]]);
        if lo.is_nan() || hi.is_nan() || lo == hi {
            continue;
        }
        let (g_right, h_right) = (g_total - g_left, h_total - h_left);
        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }

        let gain = 0.5
            * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                - parent);
        if best.map_or(true, |(_, _, g)| gain > g) {
            let mid = lo / 2.0 + hi / 2.0;
            best = Some((feature, if mid >= hi { lo } else { mid }, gain));
        }
    }
    best
}

fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    if ratio >= 1.0 {
        return indices;
    }
    let k = ((n as f64) * ratio).ceil().max(1.0) as usize;
    indices.shuffle(rng);
    indices.truncate(k);
    indices.sort_unstable();
    indices
}

/// Gradient-boosted trees for classification or regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    pub config: XGBoostConfig,
    is_classification: bool,
    boosters: Vec<Booster>,
    n_classes: usize,
    n_features: usize,
}

impl GradientBoostedTrees {
    pub fn new_classifier(config: XGBoostConfig) -> Self {
        Self::base(config, true)
    }

    pub fn new_regressor(config: XGBoostConfig) -> Self {
        Self::base(config, false)
    }

    fn base(config: XGBoostConfig, is_classification: bool) -> Self {
        Self {
            config,
            is_classification,
            boosters: Vec::new(),
            n_classes: 0,
            n_features: 0,
        }
    }

    pub fn n_boosters(&self) -> usize {
        self.boosters.len()
    }

    /// Class probabilities (classification only)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_classification {
            return Err(GridfitError::ValidationError(
                "predict_proba is only available for classification".to_string(),
            ));
        }
        self.check_fitted(x)?;

        let lr = self.config.learning_rate;
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        if self.boosters.len() == 1 {
            let p = self.boosters[0].raw_predict(x, lr).mapv(sigmoid);
            proba.column_mut(0).assign(&p.mapv(|v| 1.0 - v));
            if self.n_classes > 1 {
                proba.column_mut(1).assign(&p);
            }
        } else {
            for (class, booster) in self.boosters.iter().enumerate() {
                proba
                    .column_mut(class)
                    .assign(&booster.raw_predict(x, lr).mapv(sigmoid));
            }
            for mut row in proba.rows_mut() {
                let total = row.sum();
                if total > 0.0 {
                    row /= total;
                }
            }
        }
        Ok(proba)
    }

    fn check_fitted(&self, x: &Array2<f64>) -> Result<()> {
        if self.boosters.is_empty() {
            return Err(GridfitError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)
    }
}

impl Estimator for GradientBoostedTrees {
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let config = &mut self.config;
        match name {
            "n_estimators" => config.n_estimators = positive_usize(name, value)?,
            "learning_rate" | "eta" => config.learning_rate = float_above(name, value, 0.0)?,
            "max_depth" => config.max_depth = positive_usize(name, value)?,
            "min_child_weight" => config.min_child_weight = non_negative(name, value)?,
            "reg_lambda" | "lambda" => config.reg_lambda = non_negative(name, value)?,
            "reg_alpha" | "alpha" => config.reg_alpha = non_negative(name, value)?,
            "gamma" => config.gamma = non_negative(name, value)?,
            "subsample" => config.subsample = fraction(name, value)?,
            "colsample_bytree" => config.colsample_bytree = fraction(name, value)?,
            "random_state" | "seed" => config.random_state = value.as_i64().unwrap_or(0) as u64,
            _ => return Err(unknown_param(name, value, "GradientBoostedTrees")),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.n_features = x.ncols();
        let seed = self.config.random_state;

        self.boosters = if !self.is_classification {
            self.n_classes = 0;
            vec![Booster::train(x, y, Objective::SquaredError, &self.config, seed)]
        } else {
            self.n_classes = n_classes(y)?;
            if self.n_classes <= 2 {
                vec![Booster::train(x, y, Objective::Logistic, &self.config, seed)]
            } else {
                (0..self.n_classes)
                    .map(|class| {
                        let target = y.mapv(|v| if v as usize == class { 1.0 } else { 0.0 });
                        Booster::train(
                            x,
                            &target,
                            Objective::Logistic,
                            &self.config,
                            seed.wrapping_add(class as u64),
                        )
                    })
                    .collect()
            }
        };
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_classification {
            self.check_fitted(x)?;
            return Ok(self.boosters[0].raw_predict(x, self.config.learning_rate));
        }
        let proba = self.predict_proba(x)?;
        Ok(Array1::from_shape_fn(x.nrows(), |i| {
            let mut best = (0usize, f64::NEG_INFINITY);
            for (class, &p) in proba.row(i).iter().enumerate() {
                if p > best.1 {
                    best = (class, p);
                }
            }
            best.0 as f64
        }))
    }

    fn is_classifier(&self) -> bool {
        self.is_classification
    }
}

fn non_negative(name: &str, value: &ParamValue) -> Result<f64> {
    match value.as_f64() {
        Some(v) if v >= 0.0 && v.is_finite() => Ok(v),
        _ => Err(GridfitError::invalid_param(name, value, "expected a non-negative number")),
    }
}

fn fraction(name: &str, value: &ParamValue) -> Result<f64> {
    match value.as_f64() {
        Some(v) if v > 0.0 && v <= 1.0 => Ok(v),
        _ => Err(GridfitError::invalid_param(name, value, "expected a value in (0, 1]")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ShapeBuilder;

    fn regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((50, 2), |(i, j)| (i as f64) * 0.1 + j as f64);
        let y = Array1::from_shape_fn(50, |i| 3.0 * (i as f64) * 0.1 + 1.0);
        (x, y)
    }

    fn three_classes() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| {
            let class = i / 20;
            (class * 10) as f64 + ((i + j) % 4) as f64 * 0.25
        });
        let y = Array1::from_shape_fn(60, |i| (i / 20) as f64);
        (x, y)
    }

    #[test]
    fn test_regressor() {
        let (x, y) = regression_data();
        let mut model = GradientBoostedTrees::new_regressor(XGBoostConfig {
            n_estimators: 50,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        assert!(model.score(&x, &y).unwrap() > 0.95);
    }

    #[test]
    fn test_unbounded_depth_survives_json() {
        let x = Array2::from_shape_fn((300, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(300, |i| (i % 2) as f64);
        let mut model = GradientBoostedTrees::new_regressor(XGBoostConfig {
            n_estimators: 3,
            max_depth: 500,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedTrees = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
    }

    #[test]
    fn test_multiclass_one_vs_rest() {
        let (x, y) = three_classes();
        let mut model = GradientBoostedTrees::new_classifier(XGBoostConfig {
            n_estimators: 20,
            max_depth: 3,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();

        assert_eq!(model.n_boosters(), 3);
        assert_eq!(model.score(&x, &y).unwrap(), 1.0);
        let proba = model.predict_proba(&x).unwrap();
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_column_major_input_gives_same_predictions() {
        let (x, y) = three_classes();
        let mut column_major = Array2::zeros(x.dim().f());
        column_major.assign(&x);

        let config = XGBoostConfig {
            n_estimators: 10,
            ..Default::default()
        };
        let mut a = GradientBoostedTrees::new_classifier(config.clone());
        let mut b = GradientBoostedTrees::new_classifier(config);
        a.fit(&x, &y).unwrap();
        b.fit(&column_major, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&column_major).unwrap());
    }

    #[test]
    fn test_set_param_validation() {
        let mut model = GradientBoostedTrees::new_regressor(XGBoostConfig::default());
        model.set_param("eta", &ParamValue::Float(0.1)).unwrap();
        assert_eq!(model.config.learning_rate, 0.1);
        assert!(model.set_param("subsample", &ParamValue::Float(1.5)).is_err());
        assert!(model.set_param("learning_rate", &ParamValue::Float(0.0)).is_err());
    }

    #[test]
    fn test_leaf_weight_soft_threshold() {
        assert_eq!(leaf_weight(0.5, 1.0, 1.0, 1.0), 0.0);
        assert!((leaf_weight(3.0, 1.0, 1.0, 1.0) + 1.0).abs() < 1e-12);
    }
}
