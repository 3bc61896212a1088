//! Logistic regression, one-vs-rest for more than two classes

use super::estimator::{check_fit_input, check_predict_input, n_classes, unknown_param, Estimator};
use super::params::{boolean, float_above, positive_usize, ParamValue};
use crate::error::{GridfitError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Binary logistic model on standardized features
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryLogit {
    weights: Array1<f64>,
    bias: f64,
}

impl BinaryLogit {
    fn decision(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.bias
    }
}

/// Per-feature standardization learned at fit time
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Scaling {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Scaling {
    fn learn(x: &Array2<f64>) -> Self {
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 && s.is_finite() { s } else { 1.0 });
        Self { mean, scale }
    }

    fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }
}

/// Logistic regression classifier trained by gradient descent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// L2 regularization strength
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub learning_rate: f64,
    pub fit_intercept: bool,
    scaling: Option<Scaling>,
    /// One model for two classes, one per class otherwise
    models: Vec<BinaryLogit>,
    n_classes: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            alpha: 1e-4,
            max_iter: 300,
            tol: 1e-6,
            learning_rate: 0.5,
            fit_intercept: true,
            scaling: None,
            models: Vec::new(),
            n_classes: 0,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    fn fit_binary(&self, x: &Array2<f64>, target: &Array1<f64>) -> BinaryLogit {
        let n_samples = x.nrows() as f64;
        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..self.max_iter {
            let errors = Self::sigmoid(&(x.dot(&weights) + bias)) - target;
            let dw = x.t().dot(&errors) / n_samples + self.alpha * &weights;
            let db = if self.fit_intercept {
                errors.mean().unwrap_or(0.0)
            } else {
                0.0
            };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }
            weights = weights - self.learning_rate * dw;
            bias -= self.learning_rate * db;
        }
        BinaryLogit { weights, bias }
    }

    /// Probability of each class, rows sum to one
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let scaling = self.scaling.as_ref().ok_or(GridfitError::ModelNotFitted)?;
        check_predict_input(x, scaling.mean.len())?;
        let xs = scaling.apply(x);

        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        if self.n_classes == 2 {
            let p = Self::sigmoid(&self.models[0].decision(&xs));
            proba.column_mut(0).assign(&p.mapv(|v| 1.0 - v));
            proba.column_mut(1).assign(&p);
        } else {
            for (class, model) in self.models.iter().enumerate() {
                proba
                    .column_mut(class)
                    .assign(&Self::sigmoid(&model.decision(&xs)));
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
}

impl Estimator for LogisticRegression {
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "C" => self.alpha = 1.0 / float_above(name, value, 0.0)?,
            "alpha" => {
                self.alpha = match value.as_f64() {
                    Some(a) if a >= 0.0 && a.is_finite() => a,
                    _ => {
                        return Err(GridfitError::invalid_param(
                            name,
                            value,
                            "expected a non-negative number",
                        ))
                    }
                }
            }
            "max_iter" => self.max_iter = positive_usize(name, value)?,
            "tol" => self.tol = float_above(name, value, 0.0)?,
            "learning_rate" => self.learning_rate = float_above(name, value, 0.0)?,
            "fit_intercept" => self.fit_intercept = boolean(name, value)?,
            _ => return Err(unknown_param(name, value, "LogisticRegression")),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_classes = n_classes(y)?;
        let present = (0..n_classes)
            .filter(|&c| y.iter().any(|&v| v as usize == c))
            .count();
        if present < 2 {
            return Err(GridfitError::TrainingError(
                "logistic regression needs samples of at least two classes".to_string(),
            ));
        }

        let scaling = Scaling::learn(x);
        let xs = scaling.apply(x);

        self.models = if n_classes == 2 {
            vec![self.fit_binary(&xs, y)]
        } else {
            (0..n_classes)
                .map(|class| {
                    let target = y.mapv(|v| if v as usize == class { 1.0 } else { 0.0 });
                    self.fit_binary(&xs, &target)
                })
                .collect()
        };
        self.scaling = Some(scaling);
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.map_axis(Axis(1), |row| {
            let mut best = (0usize, f64::NEG_INFINITY);
            for (class, &p) in row.iter().enumerate() {
                if p > best.1 {
                    best = (class, p);
                }
            }
            best.0 as f64
        }))
    }

    fn is_classifier(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_binary() {
        let x = array![[0.0, 1.0], [1.0, 0.5], [1.5, 0.0], [8.0, 9.0], [9.0, 8.0], [10.0, 10.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut lr = LogisticRegression::new();
        lr.fit(&x, &y).unwrap();
        assert_eq!(lr.score(&x, &y).unwrap(), 1.0);

        let proba = lr.predict_proba(&x).unwrap();
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_one_vs_rest_multiclass() {
        let x = array![
            [0.0, 0.0], [0.5, 0.2], [0.2, 0.4],
            [10.0, 0.0], [10.5, 0.3], [9.8, 0.1],
            [0.0, 10.0], [0.3, 10.2], [0.1, 9.7]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];

        let mut lr = LogisticRegression::new().with_max_iter(500);
        lr.fit(&x, &y).unwrap();
        assert_eq!(lr.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_single_class_is_an_error() {
        let mut lr = LogisticRegression::new();
        assert!(lr.fit(&array![[1.0], [2.0]], &array![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_c_sets_alpha() {
        let mut lr = LogisticRegression::new();
        lr.set_param("C", &ParamValue::Float(10.0)).unwrap();
        assert!((lr.alpha - 0.1).abs() < 1e-12);
        assert!(lr.set_param("C", &ParamValue::Float(0.0)).is_err());
    }
}
