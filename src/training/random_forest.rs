//! Random forest classifier and regressor

use super::decision_tree::{Criterion, DecisionTree};
use super::estimator::{check_fit_input, check_predict_input, unknown_param, Estimator};
use super::params::{boolean, positive_usize, ParamValue};
use crate::error::{GridfitError, Result};
use ndarray::{Array1, Array2};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for the number of features drawn per split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    Fixed(usize),
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).floor() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }

    fn from_param(value: &ParamValue) -> Result<Self> {
        let parsed = match value {
            ParamValue::None => Some(MaxFeatures::All),
            ParamValue::Str(s) => match s.as_str() {
                "sqrt" | "auto" => Some(MaxFeatures::Sqrt),
                "log2" => Some(MaxFeatures::Log2),
                "all" => Some(MaxFeatures::All),
                _ => None,
            },
            ParamValue::Int(n) if *n > 0 => Some(MaxFeatures::Fixed(*n as usize)),
            ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Some(MaxFeatures::Fraction(*f)),
            _ => None,
        };
        parsed.ok_or_else(|| {
            GridfitError::invalid_param(
                "max_features",
                value,
                "expected sqrt, log2, all, None, a positive integer or a fraction in (0, 1]",
            )
        })
    }
}

/// Random forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub criterion: Criterion,
    pub random_state: u64,
    is_classification: bool,
    n_features: usize,
}

impl RandomForest {
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self::base(n_estimators, true)
    }

    pub fn new_regressor(n_estimators: usize) -> Self {
        Self::base(n_estimators, false)
    }

    fn base(n_estimators: usize, is_classification: bool) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: if is_classification {
                MaxFeatures::Sqrt
            } else {
                MaxFeatures::All
            },
            bootstrap: true,
            criterion: if is_classification {
                Criterion::Gini
            } else {
                Criterion::MSE
            },
            random_state: 0,
            is_classification,
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Estimator for RandomForest {
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_estimators" => self.n_estimators = positive_usize(name, value)?,
            "max_depth" => {
                self.max_depth = if value.is_none() {
                    None
                } else {
                    Some(positive_usize(name, value)?)
                }
            }
            "min_samples_split" => {
                self.min_samples_split = positive_usize(name, value)?.max(2);
            }
            "min_samples_leaf" => self.min_samples_leaf = positive_usize(name, value)?,
            "max_features" => self.max_features = MaxFeatures::from_param(value)?,
            "bootstrap" => self.bootstrap = boolean(name, value)?,
            "criterion" => {
                let criterion = value
                    .as_str()
                    .and_then(Criterion::parse)
                    .filter(|c| c.is_classification() == self.is_classification)
                    .ok_or_else(|| {
                        GridfitError::invalid_param(name, value, "criterion does not fit the task")
                    })?;
                self.criterion = criterion;
            }
            "random_state" => self.random_state = value.as_i64().unwrap_or(0) as u64,
            _ => return Err(unknown_param(name, value, "RandomForest")),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        self.n_features = x.ncols();
        let max_features = self.max_features.resolve(self.n_features);

        let trees: Result<Vec<DecisionTree>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng =
                    ChaCha8Rng::seed_from_u64(self.random_state.wrapping_add(tree_idx as u64));
                let rows: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let base = if self.is_classification {
                    DecisionTree::new_classifier()
                } else {
                    DecisionTree::new_regressor()
                };
                let mut tree = base
                    .with_criterion(self.criterion)
                    .with_max_depth(self.max_depth)
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(Some(max_features))
                    .with_random_state(rng.next_u64());
                tree.fit_rows(x, y, rows)?;
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(GridfitError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;

        let all_predictions: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<_>>()?;

        let n_trees = all_predictions.len() as f64;
        let predictions = Array1::from_shape_fn(x.nrows(), |i| {
            if self.is_classification {
                majority_vote(all_predictions.iter().map(|p| p[i]))
            } else {
                all_predictions.iter().map(|p| p[i]).sum::<f64>() / n_trees
            }
        });
        Ok(predictions)
    }

    fn is_classifier(&self) -> bool {
        self.is_classification
    }
}

/// Most frequent class; ties go to the lowest class index
pub(crate) fn majority_vote(votes: impl Iterator<Item = f64>) -> f64 {
    let mut counts: Vec<usize> = Vec::new();
    for vote in votes {
        let class = vote.round().max(0.0) as usize;
        if class >= counts.len() {
            counts.resize(class + 1, 0);
        }
        counts[class] += 1;
    }
    let mut best = (0usize, 0usize);
    for (class, &count) in counts.iter().enumerate() {
        if count > best.1 {
            best = (class, count);
        }
    }
    best.0 as f64
}
