//! Model training
//!
//! - [`registry`] - classifier kinds and their capabilities
//! - [`params`] - hyperparameter grids
//! - [`grid_search`] - cross-validated exhaustive search
//! - estimators: random forest, k-nearest neighbors, logistic regression,
//!   gradient-boosted trees and a multi-layer perceptron

pub mod cross_validation;
pub mod decision_tree;
pub mod estimator;
pub mod grid_search;
pub mod knn;
pub mod linear_models;
pub mod metrics;
pub mod model;
pub mod neural_network;
pub mod params;
pub mod random_forest;
pub mod registry;
pub mod xgboost;

pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use estimator::Estimator;
pub use grid_search::{
    worker_pool, CandidateResult, GridSearch, GridSearchResult, DEFAULT_ERROR_SCORE,
};
pub use knn::{DistanceMetric, KNearestNeighbors, WeightScheme};
pub use linear_models::LogisticRegression;
pub use metrics::{accuracy, r2_score};
pub use model::Model;
pub use neural_network::{Activation, MLPConfig, MultilayerPerceptron};
pub use params::{params_to_json, ParamGrid, ParamSet, ParamValue};
pub use random_forest::{MaxFeatures, RandomForest};
pub use registry::{BuildOptions, Capabilities, ClassifierRegistry, DatasetShape, NN_PREFIX};
pub use xgboost::{GradientBoostedTrees, XGBoostConfig};
