//! Multi-layer perceptron trained with mini-batch SGD and momentum

use super::estimator::{check_fit_input, check_predict_input, n_classes, unknown_param, Estimator};
use super::params::{float_above, positive_usize, ParamValue};
use crate::error::{GridfitError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Hidden layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    Sigmoid,
    Tanh,
    Identity,
}

impl Activation {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "relu" => Some(Activation::ReLU),
            "logistic" | "sigmoid" => Some(Activation::Sigmoid),
            "tanh" => Some(Activation::Tanh),
            "identity" | "linear" => Some(Activation::Identity),
            _ => None,
        }
    }

    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => z.mapv(f64::tanh),
            Activation::Identity => z.clone(),
        }
    }

    /// Derivative expressed through the activated output `a`
    fn derivative(&self, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => a.mapv(|v| v * (1.0 - v)),
            Activation::Tanh => a.mapv(|v| 1.0 - v * v),
            Activation::Identity => Array2::ones(a.raw_dim()),
        }
    }
}

/// Network and optimizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MLPConfig {
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    /// L2 penalty
    pub alpha: f64,
    pub momentum: f64,
    /// Epochs without training-loss improvement before stopping
    pub n_iter_no_change: usize,
    pub tol: f64,
    pub random_state: u64,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![100],
            activation: Activation::ReLU,
            learning_rate: 0.001,
            max_epochs: 200,
            batch_size: 200,
            alpha: 0.0001,
            momentum: 0.9,
            n_iter_no_change: 10,
            tol: 1e-4,
            random_state: 0,
        }
    }
}

/// Feedforward network: softmax output for classification, linear for regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultilayerPerceptron {
    pub config: MLPConfig,
    is_classification: bool,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    n_features: usize,
    /// Regression targets are standardized during training
    target_shift: (f64, f64),
}

impl MultilayerPerceptron {
    pub fn new_classifier(config: MLPConfig) -> Self {
        Self::base(config, true)
    }

    pub fn new_regressor(config: MLPConfig) -> Self {
        Self::base(config, false)
    }

    fn base(config: MLPConfig, is_classification: bool) -> Self {
        Self {
            config,
            is_classification,
            weights: Vec::new(),
            biases: Vec::new(),
            n_features: 0,
            target_shift: (0.0, 1.0),
        }
    }

    fn initialize(&mut self, n_outputs: usize, rng: &mut Xoshiro256PlusPlus) {
        let mut sizes = vec![self.n_features];
        sizes.extend(&self.config.hidden_layers);
        sizes.push(n_outputs);

        self.weights.clear();
        self.biases.clear();
        for pair in sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            // Glorot uniform
            let scale = (6.0 / (n_in + n_out) as f64).sqrt();
            self.weights.push(Array2::from_shape_fn((n_in, n_out), |_| {
                rng.gen_range(-scale..scale)
            }));
            self.biases.push(Array1::zeros(n_out));
        }
    }

    /// Activations of every layer, input included
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let last = self.weights.len() - 1;
        let mut activations = vec![x.clone()];
        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i < last {
                self.config.activation.apply(&z)
            } else if self.is_classification {
                softmax(z)
            } else {
                z
            };
            activations.push(a);
        }
        activations
    }

    /// Gradients per layer; `target` is one-hot or the scaled regression target
    fn backward(
        &self,
        activations: &[Array2<f64>],
        target: &Array2<f64>,
    ) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = target.nrows() as f64;
        let output = &activations[activations.len() - 1];
        let mut delta = (output - target) / n;
        let mut gradients = Vec::with_capacity(self.weights.len());

        for i in (0..self.weights.len()).rev() {
            let grad_w = activations[i].t().dot(&delta) + &self.weights[i] * (self.config.alpha / n);
            let grad_b = delta.sum_axis(Axis(0));
            if i > 0 {
                delta = delta.dot(&self.weights[i].t())
                    * self.config.activation.derivative(&activations[i]);
            }
            gradients.push((grad_w, grad_b));
        }
        gradients.reverse();
        gradients
    }

    fn loss(&self, output: &Array2<f64>, target: &Array2<f64>) -> f64 {
        let n = target.nrows().max(1) as f64;
        if self.is_classification {
            -(target * &output.mapv(|p| p.max(1e-12).ln())).sum() / n
        } else {
            (output - target).mapv(|d| d * d).sum() / (2.0 * n)
        }
    }

    fn targets(&self, y: &Array1<f64>, n_outputs: usize) -> Array2<f64> {
        if self.is_classification {
            let mut onehot = Array2::zeros((y.len(), n_outputs));
            for (i, &class) in y.iter().enumerate() {
                onehot[[i, class as usize]] = 1.0;
            }
            onehot
        } else {
            let (mean, std) = self.target_shift;
            y.mapv(|v| (v - mean) / std).insert_axis(Axis(1))
        }
    }

    /// Class probabilities (classification only)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_classification {
            return Err(GridfitError::ValidationError(
                "predict_proba is only available for classification".to_string(),
            ));
        }
        self.output(x)
    }

    fn output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.weights.is_empty() {
            return Err(GridfitError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;
        let mut activations = self.forward(x);
        activations
            .pop()
            .ok_or(GridfitError::ModelNotFitted)
    }
}

fn softmax(mut z: Array2<f64>) -> Array2<f64> {
    for mut row in z.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    z
}

impl Estimator for MultilayerPerceptron {
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let config = &mut self.config;
        match name {
            "hidden_layer_sizes" => config.hidden_layers = parse_layers(value)?,
            "activation" => {
                config.activation = value.as_str().and_then(Activation::parse).ok_or_else(|| {
                    GridfitError::invalid_param(
                        name,
                        value,
                        "expected relu, logistic, tanh or identity",
                    )
                })?
            }
            "alpha" => {
                config.alpha = match value.as_f64() {
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
            "learning_rate_init" | "learning_rate" => {
                config.learning_rate = float_above(name, value, 0.0)?
            }
            "max_iter" => config.max_epochs = positive_usize(name, value)?,
            "batch_size" => config.batch_size = positive_usize(name, value)?,
            "momentum" => {
                config.momentum = match value.as_f64() {
                    Some(m) if (0.0..1.0).contains(&m) => m,
                    _ => return Err(GridfitError::invalid_param(name, value, "expected [0, 1)")),
                }
            }
            "random_state" => config.random_state = value.as_i64().unwrap_or(0) as u64,
            _ => return Err(unknown_param(name, value, "MultilayerPerceptron")),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        self.n_features = x.ncols();

        let n_outputs = if self.is_classification {
            n_classes(y)?
        } else {
            let mean = y.mean().unwrap_or(0.0);
            let std = y.std(0.0);
            self.target_shift = (mean, if std > 1e-12 { std } else { 1.0 });
            1
        };

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        self.initialize(n_outputs, &mut rng);
        let target = self.targets(y, n_outputs);

        let mut velocity_w: Vec<Array2<f64>> =
            self.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
        let mut velocity_b: Vec<Array1<f64>> =
            self.biases.iter().map(|b| Array1::zeros(b.len())).collect();

        let (lr, momentum) = (self.config.learning_rate, self.config.momentum);
        let batch_size = self.config.batch_size.min(n_samples);
        let mut best_loss = f64::INFINITY;
        let mut stale_epochs = 0;
        let mut indices: Vec<usize> = (0..n_samples).collect();

        for _ in 0..self.config.max_epochs {
            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in indices.chunks(batch_size) {
                let x_batch = x.select(Axis(0), batch);
                let t_batch = target.select(Axis(0), batch);

                let activations = self.forward(&x_batch);
                epoch_loss += self.loss(&activations[activations.len() - 1], &t_batch)
                    * batch.len() as f64;

                for (i, (grad_w, grad_b)) in self.backward(&activations, &t_batch).into_iter().enumerate() {
                    velocity_w[i] = &velocity_w[i] * momentum - &grad_w * lr;
                    velocity_b[i] = &velocity_b[i] * momentum - &grad_b * lr;
                    self.weights[i] += &velocity_w[i];
                    self.biases[i] += &velocity_b[i];
                }
            }

            epoch_loss /= n_samples as f64;
            if !epoch_loss.is_finite() {
                return Err(GridfitError::TrainingError(
                    "training loss diverged; try a smaller learning rate".to_string(),
                ));
            }
            if epoch_loss < best_loss - self.config.tol {
                best_loss = epoch_loss;
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
                if stale_epochs >= self.config.n_iter_no_change {
                    break;
                }
            }
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let output = self.output(x)?;
        if !self.is_classification {
            let (mean, std) = self.target_shift;
            return Ok(output.column(0).mapv(|v| v * std + mean));
        }
        Ok(output.map_axis(Axis(1), |row| {
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
        self.is_classification
    }
}

/// Layer widths from an integer (`64`) or a comma list (`"64,32"`)
fn parse_layers(value: &ParamValue) -> Result<Vec<usize>> {
    let invalid = || {
        GridfitError::invalid_param(
            "hidden_layer_sizes",
            value,
            "expected a positive integer or a comma-separated list of them",
        )
    };
    match value {
        ParamValue::Int(n) if *n > 0 => Ok(vec![*n as usize]),
        ParamValue::Str(s) => s
            .split(',')
            .map(|part| part.trim().parse::<usize>().ok().filter(|&n| n > 0).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}
