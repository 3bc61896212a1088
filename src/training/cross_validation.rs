//! Cross-validation splitters

use crate::error::{GridfitError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// Contiguous folds over the sample order
    KFold { n_splits: usize },
    /// Folds that keep each class's share of samples
    StratifiedKFold { n_splits: usize },
}

impl CVStrategy {
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits } | CVStrategy::StratifiedKFold { n_splits } => *n_splits,
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    shuffle_seed: Option<u64>,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            shuffle_seed: None,
        }
    }

    /// Shuffle samples (within each class when stratified) before folding
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn strategy(&self) -> CVStrategy {
        self.strategy
    }

    /// Generate train/test splits; `y` holds class indices when stratified
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let n_splits = self.strategy.n_splits();
        let n_samples = y.len();
        if n_splits < 2 {
            return Err(GridfitError::ValidationError(format!(
                "n_splits must be at least 2, got {}",
                n_splits
            )));
        }
        if n_samples < n_splits {
            return Err(GridfitError::ValidationError(format!(
                "cannot have n_splits={} greater than the number of samples: n_samples={}",
                n_splits, n_samples
            )));
        }

        let folds = match self.strategy {
            CVStrategy::KFold { .. } => self.k_fold(n_samples, n_splits),
            CVStrategy::StratifiedKFold { .. } => self.stratified_k_fold(y, n_splits),
        };
        Ok(to_splits(folds))
    }

    fn rng(&self) -> Option<ChaCha8Rng> {
        self.shuffle_seed.map(ChaCha8Rng::seed_from_u64)
    }

    fn k_fold(&self, n_samples: usize, n_splits: usize) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if let Some(mut rng) = self.rng() {
            indices.shuffle(&mut rng);
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut folds = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let size = if fold_idx < remainder { base + 1 } else { base };
            folds.push(indices[current..current + size].to_vec());
            current += size;
        }
        folds
    }

    /// Deal each class round-robin over the folds, continuing the fold
    /// counter from one class to the next. Per-class counts per fold differ
    /// by at most one, but which folds get the extra sample is not the
    /// allocation sklearn's `StratifiedKFold` makes.
    fn stratified_k_fold(&self, y: &Array1<f64>, n_splits: usize) -> Vec<Vec<usize>> {
        // BTreeMap keeps class order, and with it fold assignment, stable
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        let mut rng = self.rng();
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut next_fold = 0;
        for indices in class_indices.values_mut() {
            if let Some(rng) = rng.as_mut() {
                indices.shuffle(rng);
            }
            for &idx in indices.iter() {
                folds[next_fold].push(idx);
                next_fold = (next_fold + 1) % n_splits;
            }
        }
        for fold in &mut folds {
            fold.sort_unstable();
        }
        folds
    }
}

fn to_splits(folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
    (0..folds.len())
        .map(|fold_idx| CVSplit {
            test_indices: folds[fold_idx].clone(),
            train_indices: folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect(),
            fold_idx,
        })
        .collect()
}

/// Summary statistics over fold scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVResults {
    pub scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
}

impl CVResults {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n = scores.len().max(1) as f64;
        let mean_score = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n;
        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
        }
    }
}
