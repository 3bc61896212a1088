//! Exhaustive, cross-validated hyperparameter search
//!
//! Every candidate in the grid is scored on every fold. A fold whose fit or
//! score fails is given the error score instead of aborting the search.
//! The winner is refit on all of the training data.

use super::cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
use super::estimator::Estimator;
use super::params::{ParamGrid, ParamSet};
use crate::error::{GridfitError, Result};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Score used for folds that fail
pub const DEFAULT_ERROR_SCORE: f64 = 0.0;

/// Result for one parameter combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub params: ParamSet,
    pub cv: CVResults,
    /// Error messages of failed folds, by fold index
    pub failures: Vec<(usize, String)>,
}

impl CandidateResult {
    pub fn mean_score(&self) -> f64 {
        self.cv.mean_score
    }
}

/// Outcome of a completed search
#[derive(Debug, Clone)]
pub struct GridSearchResult<E> {
    pub best_index: usize,
    pub best_score: f64,
    pub best_params: ParamSet,
    /// Clone of the base estimator with the best params, fit on all training rows
    pub best_estimator: E,
    pub candidates: Vec<CandidateResult>,
    pub elapsed_secs: f64,
}

impl<E> GridSearchResult<E> {
    pub fn n_failed_fits(&self) -> usize {
        self.candidates.iter().map(|c| c.failures.len()).sum()
    }
}

/// Thread pool with `n_jobs` workers; 0 uses every available core
pub fn worker_pool(n_jobs: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_jobs)
        .build()
        .map_err(|e| GridfitError::TrainingError(format!("failed to start workers: {}", e)))
}

/// Grid search over an estimator
#[derive(Debug, Clone)]
pub struct GridSearch<E: Estimator> {
    estimator: E,
    grid: ParamGrid,
    cv_folds: usize,
    n_jobs: usize,
    pool: Option<Arc<rayon::ThreadPool>>,
    error_score: f64,
}

struct Fold {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
}

impl Fold {
    fn from_split(x: &Array2<f64>, y: &Array1<f64>, split: &CVSplit) -> Self {
        Self {
            x_train: select_rows(x, &split.train_indices),
            y_train: y.select(Axis(0), &split.train_indices),
            x_test: select_rows(x, &split.test_indices),
            y_test: y.select(Axis(0), &split.test_indices),
        }
    }
}

/// Row subset that keeps the memory order of the source
fn select_rows(x: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    let selected = x.select(Axis(0), rows);
    let column_major_source = !x.is_standard_layout() && x.t().is_standard_layout();
    if !column_major_source {
        return selected;
    }
    let mut column_major = Array2::zeros(ndarray::ShapeBuilder::f(selected.dim()));
    column_major.assign(&selected);
    column_major
}

impl<E: Estimator> GridSearch<E> {
    pub fn new(estimator: E, grid: ParamGrid) -> Self {
        Self {
            estimator,
            grid,
            cv_folds: 5,
            n_jobs: 0,
            pool: None,
            error_score: DEFAULT_ERROR_SCORE,
        }
    }

    pub fn with_cv(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    /// Worker threads; 0 uses every available core
    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Run on an existing pool instead of building one from `n_jobs`
    pub fn with_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_error_score(mut self, score: f64) -> Self {
        self.error_score = score;
        self
    }

    pub fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    fn strategy(&self) -> CVStrategy {
        if self.estimator.is_classifier() {
            CVStrategy::StratifiedKFold {
                n_splits: self.cv_folds,
            }
        } else {
            CVStrategy::KFold {
                n_splits: self.cv_folds,
            }
        }
    }

    /// Run the search
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<GridSearchResult<E>> {
        if x.nrows() != y.len() {
            return Err(GridfitError::ShapeError {
                expected: format!("{} targets", x.nrows()),
                actual: format!("{} targets", y.len()),
            });
        }
        let start = Instant::now();

        let splits = CrossValidator::new(self.strategy()).split(y)?;
        let folds: Vec<Fold> = splits.iter().map(|s| Fold::from_split(x, y, s)).collect();
        let candidates = self.grid.candidates();

        info!(
            candidates = candidates.len(),
            folds = folds.len(),
            fits = candidates.len() * folds.len(),
            "Starting grid search"
        );

        let pool = match &self.pool {
            Some(pool) => Arc::clone(pool),
            None => Arc::new(worker_pool(self.n_jobs)?),
        };

        let jobs: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();
        let outcomes: Vec<Result<f64>> = pool.install(|| {
            jobs.par_iter()
                .map(|&(c, f)| self.evaluate(&candidates[c], &folds[f]))
                .collect()
        });

        let mut results = Vec::with_capacity(candidates.len());
        for (c, params) in candidates.into_iter().enumerate() {
            let mut scores = Vec::with_capacity(folds.len());
            let mut failures = Vec::new();
            for f in 0..folds.len() {
                match &outcomes[c * folds.len() + f] {
                    Ok(score) => scores.push(*score),
                    Err(e) => {
                        debug!(candidate = c, fold = f, error = %e, "Fit failed, using error score");
                        scores.push(self.error_score);
                        failures.push((f, e.to_string()));
                    }
                }
            }
            results.push(CandidateResult {
                params,
                cv: CVResults::from_scores(scores),
                failures,
            });
        }

        let best_index = best_candidate(&results);
        let best = &results[best_index];
        let failed: usize = results.iter().map(|r| r.failures.len()).sum();
        if failed > 0 {
            warn!(failed, "Some fits failed and were scored {}", self.error_score);
        }

        // estimators parallelize internally; the refit stays on the same workers
        let mut best_estimator = self.estimator.clone();
        best_estimator.set_params(&best.params)?;
        pool.install(|| best_estimator.fit(x, y)).map_err(|e| {
            GridfitError::TrainingError(format!("refit with best parameters failed: {}", e))
        })?;

        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            best_score = best.mean_score(),
            elapsed_secs,
            "Grid search finished"
        );

        Ok(GridSearchResult {
            best_index,
            best_score: best.mean_score(),
            best_params: best.params.clone(),
            best_estimator,
            candidates: results,
            elapsed_secs,
        })
    }

    fn evaluate(&self, params: &ParamSet, fold: &Fold) -> Result<f64> {
        let mut estimator = self.estimator.clone();
        estimator.set_params(params)?;
        estimator.fit(&fold.x_train, &fold.y_train)?;
        let score = estimator.score(&fold.x_test, &fold.y_test)?;
        if score.is_nan() {
            return Err(GridfitError::TrainingError("score is NaN".to_string()));
        }
        Ok(score)
    }
}

/// Highest mean score; the earliest candidate wins ties
fn best_candidate(results: &[CandidateResult]) -> usize {
    let mut best = 0;
    for (i, result) in results.iter().enumerate().skip(1) {
        if result.mean_score() > results[best].mean_score() {
            best = i;
        }
    }
    best
}
