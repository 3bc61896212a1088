//! Classifier kinds and what each of them can do
//!
//! A kind is looked up by name, e.g. `clRandomForest`. Its capabilities
//! say how to build the searched estimator, which grid to search, whether
//! a larger model is trained on all data afterwards, and whether features
//! are converted before training. Kinds named `clnn*` train on the
//! normalized feature file.

use super::knn::KNearestNeighbors;
use super::linear_models::LogisticRegression;
use super::model::Model;
use super::neural_network::{MLPConfig, MultilayerPerceptron};
use super::params::{ParamGrid, ParamValue};
use super::random_forest::RandomForest;
use super::xgboost::{GradientBoostedTrees, XGBoostConfig};
use crate::config::ProblemType;
use crate::data::{to_column_major, Adaptation, FeatureMatrix};
use crate::error::{GridfitError, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Kind-name prefix for models trained on normalized features
pub const NN_PREFIX: &str = "clnn";

const BOTH: &[ProblemType] = &[ProblemType::Category, ProblemType::Regression];
const CATEGORY_ONLY: &[ProblemType] = &[ProblemType::Category];

/// Settings shared by every factory call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub dev: bool,
    pub random_state: u64,
}

/// Size of the training data a grid is made for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetShape {
    pub n_samples: usize,
    pub n_features: usize,
    pub cv_folds: usize,
}

impl DatasetShape {
    /// Rows each cross-validation fit trains on, at least
    pub fn min_fold_train_size(&self) -> usize {
        let folds = self.cv_folds.max(2);
        self.n_samples - self.n_samples.div_ceil(folds)
    }
}

pub type Factory = fn(ProblemType, &BuildOptions) -> Model;
pub type GridMaker = fn(ProblemType, &DatasetShape, bool) -> ParamGrid;
pub type Adapter = fn(&FeatureMatrix) -> Adaptation;

/// What a classifier kind supports
#[derive(Clone, Copy)]
pub struct Capabilities {
    kind: &'static str,
    problem_types: &'static [ProblemType],
    construct: Factory,
    construct_big: Option<Factory>,
    param_grid: GridMaker,
    adapter: Option<Adapter>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("kind", &self.kind)
            .field("problem_types", &self.problem_types)
            .field("extended_training", &self.extended_training())
            .field("adapts_features", &self.adapter.is_some())
            .finish()
    }
}

impl Capabilities {
    pub fn new(kind: &'static str, construct: Factory, param_grid: GridMaker) -> Self {
        Self {
            kind,
            problem_types: BOTH,
            construct,
            construct_big: None,
            param_grid,
            adapter: None,
        }
    }

    pub fn with_problem_types(mut self, problem_types: &'static [ProblemType]) -> Self {
        self.problem_types = problem_types;
        self
    }

    /// Train a larger model on the full dataset after the search
    pub fn with_extended_training(mut self, construct_big: Factory) -> Self {
        self.construct_big = Some(construct_big);
        self
    }

    pub fn with_adaptation(mut self, adapter: Adapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn supports(&self, problem: ProblemType) -> bool {
        self.problem_types.contains(&problem)
    }

    pub fn extended_training(&self) -> bool {
        self.construct_big.is_some()
    }

    pub fn uses_normalized_features(&self) -> bool {
        self.kind.starts_with(NN_PREFIX)
    }

    pub fn construct(&self, problem: ProblemType, options: &BuildOptions) -> Model {
        (self.construct)(problem, options)
    }

    pub fn construct_big(&self, problem: ProblemType, options: &BuildOptions) -> Option<Model> {
        self.construct_big.map(|f| f(problem, options))
    }

    pub fn param_grid(&self, problem: ProblemType, shape: &DatasetShape, dev: bool) -> ParamGrid {
        (self.param_grid)(problem, shape, dev)
    }

    /// `None` when this kind trains on features as loaded
    pub fn adapt(&self, x: &FeatureMatrix) -> Option<Adaptation> {
        self.adapter.map(|f| f(x))
    }
}

/// Lookup table from kind name to capabilities
#[derive(Debug, Clone, Default)]
pub struct ClassifierRegistry {
    kinds: BTreeMap<&'static str, Capabilities>,
}

impl ClassifierRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in kind
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(
            Capabilities::new("clRandomForest", random_forest, random_forest_grid)
                .with_extended_training(big_random_forest),
        );
        registry.register(Capabilities::new("clKNeighbors", k_neighbors, k_neighbors_grid));
        registry.register(
            Capabilities::new("clLogisticRegression", logistic_regression, logistic_grid)
                .with_problem_types(CATEGORY_ONLY),
        );
        registry.register(
            Capabilities::new("clXGBoost", xgboost, xgboost_grid)
                .with_extended_training(big_xgboost)
                .with_adaptation(to_column_major),
        );
        registry.register(Capabilities::new("clnnMLP", mlp, mlp_grid));
        registry
    }

    /// Add a kind, replacing any kind of the same name
    pub fn register(&mut self, capabilities: Capabilities) {
        self.kinds.insert(capabilities.kind, capabilities);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.keys().copied()
    }

    pub fn get(&self, kind: &str) -> Result<&Capabilities> {
        self.kinds
            .get(kind)
            .ok_or_else(|| GridfitError::UnknownClassifier(kind.to_string()))
    }

    /// Capabilities for `kind`, checked against the problem type
    pub fn lookup(&self, kind: &str, problem: ProblemType) -> Result<&Capabilities> {
        let capabilities = self.get(kind)?;
        if !capabilities.supports(problem) {
            return Err(GridfitError::UnsupportedProblemType {
                kind: kind.to_string(),
                problem: problem.to_string(),
            });
        }
        Ok(capabilities)
    }
}

fn scaled(dev: bool, normal: usize, small: usize) -> usize {
    if dev {
        small
    } else {
        normal
    }
}

fn random_forest(problem: ProblemType, options: &BuildOptions) -> Model {
    forest(problem, scaled(options.dev, 100, 10), options.random_state)
}

fn big_random_forest(problem: ProblemType, options: &BuildOptions) -> Model {
    forest(problem, scaled(options.dev, 500, 20), options.random_state)
}

fn forest(problem: ProblemType, n_estimators: usize, seed: u64) -> Model {
    let rf = if problem.is_classification() {
        RandomForest::new_classifier(n_estimators)
    } else {
        RandomForest::new_regressor(n_estimators)
    };
    rf.with_random_state(seed).into()
}

// n_estimators stays out of this grid so the big model keeps its own count
fn random_forest_grid(problem: ProblemType, _shape: &DatasetShape, dev: bool) -> ParamGrid {
    if dev {
        return ParamGrid::new()
            .with("max_features", vec!["sqrt"])
            .with("min_samples_leaf", vec![1i64, 2]);
    }
    let grid = ParamGrid::new()
        .with(
            "max_features",
            vec![ParamValue::from("sqrt"), ParamValue::from("log2"), ParamValue::None],
        )
        .with("min_samples_leaf", vec![1i64, 2, 4]);
    if problem.is_classification() {
        grid.with("criterion", vec!["gini", "entropy"])
    } else {
        grid
    }
}

fn k_neighbors(problem: ProblemType, _options: &BuildOptions) -> Model {
    if problem.is_classification() {
        KNearestNeighbors::new_classifier(5).into()
    } else {
        KNearestNeighbors::new_regressor(5).into()
    }
}

fn k_neighbors_grid(_problem: ProblemType, shape: &DatasetShape, dev: bool) -> ParamGrid {
    let candidates: &[i64] = if dev { &[1, 3] } else { &[1, 3, 5, 7, 11, 15, 21] };
    let limit = shape.min_fold_train_size().max(1) as i64;
    let mut neighbors: Vec<i64> = candidates.iter().copied().filter(|&k| k <= limit).collect();
    if neighbors.is_empty() {
        neighbors.push(1);
    }

    let grid = ParamGrid::new().with("n_neighbors", neighbors);
    if dev {
        grid.with("weights", vec!["uniform"])
    } else {
        grid.with("weights", vec!["uniform", "distance"])
            .with("p", vec![1i64, 2])
    }
}

fn logistic_regression(_problem: ProblemType, _options: &BuildOptions) -> Model {
    LogisticRegression::new().into()
}

fn logistic_grid(_problem: ProblemType, _shape: &DatasetShape, dev: bool) -> ParamGrid {
    if dev {
        ParamGrid::new().with("C", vec![0.1f64, 1.0])
    } else {
        ParamGrid::new()
            .with("C", vec![0.01f64, 0.1, 1.0, 10.0, 100.0])
            .with("max_iter", vec![300i64])
    }
}

fn xgboost(problem: ProblemType, options: &BuildOptions) -> Model {
    boosted(problem, scaled(options.dev, 100, 10), options.random_state)
}

fn big_xgboost(problem: ProblemType, options: &BuildOptions) -> Model {
    boosted(problem, scaled(options.dev, 400, 20), options.random_state)
}

fn boosted(problem: ProblemType, n_estimators: usize, seed: u64) -> Model {
    let config = XGBoostConfig {
        n_estimators,
        random_state: seed,
        ..Default::default()
    };
    if problem.is_classification() {
        GradientBoostedTrees::new_classifier(config).into()
    } else {
        GradientBoostedTrees::new_regressor(config).into()
    }
}

fn xgboost_grid(_problem: ProblemType, _shape: &DatasetShape, dev: bool) -> ParamGrid {
    if dev {
        ParamGrid::new()
            .with("max_depth", vec![3i64])
            .with("learning_rate", vec![0.1f64, 0.3])
    } else {
        ParamGrid::new()
            .with("max_depth", vec![3i64, 6])
            .with("learning_rate", vec![0.05f64, 0.1, 0.3])
            .with("subsample", vec![0.8f64, 1.0])
    }
}

fn mlp(problem: ProblemType, options: &BuildOptions) -> Model {
    let config = MLPConfig {
        max_epochs: scaled(options.dev, 200, 50),
        random_state: options.random_state,
        ..Default::default()
    };
    if problem.is_classification() {
        MultilayerPerceptron::new_classifier(config).into()
    } else {
        MultilayerPerceptron::new_regressor(config).into()
    }
}

fn mlp_grid(_problem: ProblemType, _shape: &DatasetShape, dev: bool) -> ParamGrid {
    if dev {
        return ParamGrid::new()
            .with("hidden_layer_sizes", vec![16i64])
            .with("learning_rate_init", vec![0.01f64]);
    }
    ParamGrid::new()
        .with(
            "hidden_layer_sizes",
            vec![ParamValue::Int(32), ParamValue::Int(64), ParamValue::from("64,32")],
        )
        .with("alpha", vec![1e-4f64, 1e-3, 1e-2])
        .with("learning_rate_init", vec![0.001f64, 0.01])
}
