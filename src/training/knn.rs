//! K-nearest neighbors classifier and regressor

use super::estimator::{check_fit_input, check_predict_input, unknown_param, Estimator};
use super::params::{float_above, positive_usize, ParamValue};
use crate::error::{GridfitError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
    Minkowski(f64),
}

/// Weighting of neighbor votes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightScheme {
    Uniform,
    /// Inverse distance
    Distance,
}

impl WeightScheme {
    fn weight(&self, dist: f64) -> f64 {
        match self {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance => 1.0 / (dist + 1e-10),
        }
    }
}

/// K-nearest neighbors model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNearestNeighbors {
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
    is_classification: bool,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl KNearestNeighbors {
    pub fn new_classifier(n_neighbors: usize) -> Self {
        Self::base(n_neighbors, true)
    }

    pub fn new_regressor(n_neighbors: usize) -> Self {
        Self::base(n_neighbors, false)
    }

    fn base(n_neighbors: usize, is_classification: bool) -> Self {
        Self {
            n_neighbors,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
            is_classification,
            x_train: None,
            y_train: None,
        }
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }
}

impl Estimator for KNearestNeighbors {
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_neighbors" => self.n_neighbors = positive_usize(name, value)?,
            "weights" => {
                self.weights = match value.as_str() {
                    Some("uniform") => WeightScheme::Uniform,
                    Some("distance") => WeightScheme::Distance,
                    _ => {
                        return Err(GridfitError::invalid_param(
                            name,
                            value,
                            "expected uniform or distance",
                        ))
                    }
                }
            }
            "metric" => {
                self.metric = match value.as_str() {
                    Some("euclidean") => DistanceMetric::Euclidean,
                    Some("manhattan") => DistanceMetric::Manhattan,
                    Some("minkowski") => DistanceMetric::Minkowski(2.0),
                    _ => {
                        return Err(GridfitError::invalid_param(
                            name,
                            value,
                            "expected euclidean, manhattan or minkowski",
                        ))
                    }
                }
            }
            "p" => {
                self.metric = match float_above(name, value, 0.0)? {
                    p if p == 1.0 => DistanceMetric::Manhattan,
                    p if p == 2.0 => DistanceMetric::Euclidean,
                    p => DistanceMetric::Minkowski(p),
                }
            }
            _ => return Err(unknown_param(name, value, "KNearestNeighbors")),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.n_neighbors > x.nrows() {
            return Err(GridfitError::ValidationError(format!(
                "expected n_neighbors <= n_samples, but n_samples = {}, n_neighbors = {}",
                x.nrows(),
                self.n_neighbors
            )));
        }
        self.x_train = Some(x.to_owned());
        self.y_train = Some(y.to_owned());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(GridfitError::ModelNotFitted),
        };
        check_predict_input(x, x_train.ncols())?;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors =
                    find_k_nearest(x.row(i), x_train, y_train, self.n_neighbors, self.metric);
                if self.is_classification {
                    vote(&neighbors, self.weights)
                } else {
                    weighted_mean(&neighbors, self.weights)
                }
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    fn is_classifier(&self) -> bool {
        self.is_classification
    }
}

/// Max-heap entry; ties on distance are broken by training row order
struct Candidate {
    dist: f64,
    row: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then(self.row.cmp(&other.row))
    }
}

/// The k closest training rows as (distance, target) pairs
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (row, train) in x_train.rows().into_iter().enumerate() {
        let candidate = Candidate {
            dist: distance(point, train, metric),
            row,
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().map_or(false, |top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }
    heap.into_sorted_vec()
        .into_iter()
        .map(|c| (c.dist, y_train[c.row]))
        .collect()
}

fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    let diffs = a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs());
    match metric {
        DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
        DistanceMetric::Manhattan => diffs.sum(),
        DistanceMetric::Minkowski(p) => diffs.map(|d| d.powf(p)).sum::<f64>().powf(1.0 / p),
    }
}

/// Weighted majority vote; ties go to the lowest class index
fn vote(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let mut totals: Vec<f64> = Vec::new();
    for &(dist, label) in neighbors {
        let class = label.round().max(0.0) as usize;
        if class >= totals.len() {
            totals.resize(class + 1, 0.0);
        }
        totals[class] += weights.weight(dist);
    }
    let mut best = (0usize, f64::NEG_INFINITY);
    for (class, &total) in totals.iter().enumerate() {
        if total > best.1 {
            best = (class, total);
        }
    }
    best.0 as f64
}

fn weighted_mean(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let (sum, total) = neighbors
        .iter()
        .fold((0.0, 0.0), |(sum, total), &(dist, y)| {
            let w = weights.weight(dist);
            (sum + w * y, total + w)
        });
    sum / total
}
