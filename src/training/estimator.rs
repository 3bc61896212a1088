//! The estimator contract used by grid search and the pipeline

use super::metrics::{accuracy, r2_score};
use super::params::{ParamSet, ParamValue};
use crate::error::{GridfitError, Result};
use ndarray::{Array1, Array2};

/// A configurable, trainable model.
///
/// Classifiers are trained on class indices (`0..k` as `f64`) and predict
/// class indices; regressors predict the target directly.
pub trait Estimator: Clone + Send + Sync {
    /// Set one hyperparameter by name
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Set every hyperparameter in `params`, stopping at the first failure
    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn is_classifier(&self) -> bool;

    /// Accuracy for classifiers, R² for regressors
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let predictions = self.predict(x)?;
        if self.is_classifier() {
            accuracy(y, &predictions)
        } else {
            r2_score(y, &predictions)
        }
    }
}

/// Check that features and targets describe the same, non-empty sample set
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(GridfitError::ShapeError {
            expected: format!("{} targets", x.nrows()),
            actual: format!("{} targets", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(GridfitError::ValidationError(
            "cannot fit on an empty dataset".to_string(),
        ));
    }
    Ok(())
}

/// Check that prediction input has the width the model was trained on
pub(crate) fn check_predict_input(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(GridfitError::ShapeError {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Number of classes implied by class-index targets
pub(crate) fn n_classes(y: &Array1<f64>) -> Result<usize> {
    let mut max = 0usize;
    for &v in y {
        if !(v >= 0.0 && v.fract() == 0.0) {
            return Err(GridfitError::DataError(format!(
                "classification target {} is not a class index",
                v
            )));
        }
        max = max.max(v as usize);
    }
    Ok(max + 1)
}

pub(crate) fn unknown_param(name: &str, value: &ParamValue, model: &str) -> GridfitError {
    GridfitError::invalid_param(name, value, format!("not a parameter of {}", model))
}
