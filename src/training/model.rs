//! The closed set of trainable models

use super::estimator::Estimator;
use super::knn::KNearestNeighbors;
use super::linear_models::LogisticRegression;
use super::neural_network::MultilayerPerceptron;
use super::params::ParamValue;
use super::random_forest::RandomForest;
use super::xgboost::GradientBoostedTrees;
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Any model a classifier kind can build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Model {
    RandomForest(RandomForest),
    KNeighbors(KNearestNeighbors),
    LogisticRegression(LogisticRegression),
    GradientBoosting(GradientBoostedTrees),
    Mlp(MultilayerPerceptron),
}

macro_rules! dispatch {
    ($model:expr, $inner:ident => $body:expr) => {
        match $model {
            Model::RandomForest($inner) => $body,
            Model::KNeighbors($inner) => $body,
            Model::LogisticRegression($inner) => $body,
            Model::GradientBoosting($inner) => $body,
            Model::Mlp($inner) => $body,
        }
    };
}

impl Model {
    pub fn model_type(&self) -> &'static str {
        match self {
            Model::RandomForest(_) => "RandomForest",
            Model::KNeighbors(_) => "KNearestNeighbors",
            Model::LogisticRegression(_) => "LogisticRegression",
            Model::GradientBoosting(_) => "GradientBoostedTrees",
            Model::Mlp(_) => "MultilayerPerceptron",
        }
    }
}

impl Estimator for Model {
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        dispatch!(self, m => m.set_param(name, value))
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        dispatch!(self, m => m.fit(x, y))
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        dispatch!(self, m => m.predict(x))
    }

    fn is_classifier(&self) -> bool {
        dispatch!(self, m => m.is_classifier())
    }
}

impl From<RandomForest> for Model {
    fn from(m: RandomForest) -> Self {
        Model::RandomForest(m)
    }
}

impl From<KNearestNeighbors> for Model {
    fn from(m: KNearestNeighbors) -> Self {
        Model::KNeighbors(m)
    }
}

impl From<LogisticRegression> for Model {
    fn from(m: LogisticRegression) -> Self {
        Model::LogisticRegression(m)
    }
}

impl From<GradientBoostedTrees> for Model {
    fn from(m: GradientBoostedTrees) -> Self {
        Model::GradientBoosting(m)
    }
}

impl From<MultilayerPerceptron> for Model {
    fn from(m: MultilayerPerceptron) -> Self {
        Model::Mlp(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dispatch_and_bincode() {
        let x = array![[0.0], [1.0], [10.0], [11.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut model: Model = KNearestNeighbors::new_classifier(1).into();
        model.set_param("n_neighbors", &ParamValue::Int(1)).unwrap();
        model.fit(&x, &y).unwrap();
        assert!(model.is_classifier());
        assert_eq!(model.model_type(), "KNearestNeighbors");

        let bytes = bincode::serialize(&model).unwrap();
        let restored: Model = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
    }
}
