//! The trainer: load → split → adapt → search → report → finalize → save
//!
//! Each stage is a method on [`Trainer`] so it can be driven on its own;
//! [`Trainer::run`] chains them for a normal invocation.

use crate::config::TrainerConfig;
use crate::data::split::split_sizes;
use crate::data::{
    encode_targets, load_features, load_labels, train_test_split, Adaptation, EncodedTargets,
    FeatureMatrix, FeatureSource, Labels, LoadedFeatures, Split, SplitMode,
};
use crate::error::{GridfitError, Result};
use crate::export::{artifact_path, save_artifact, ModelMetadata};
use crate::messaging::ParentChannel;
use crate::training::{
    params_to_json, worker_pool, BuildOptions, CandidateResult, Capabilities, ClassifierRegistry,
    DatasetShape, Estimator, GridSearch, GridSearchResult, Model, ParamGrid, ParamSet,
};
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Message type of the final structured report
pub const TRAINING_RESULTS: &str = "trainingResults";

/// Features, labels and numeric targets for one run
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: LoadedFeatures,
    pub labels: Labels,
    pub targets: EncodedTargets,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.features.matrix.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.matrix.ncols()
    }
}

/// The model that gets persisted
#[derive(Debug, Clone)]
pub struct FinalModel {
    pub model: Model,
    /// True when this is the big model fit on the full dataset
    pub extended: bool,
    /// Score of the big model on the data it was fit on
    pub big_score: Option<f64>,
    pub n_training_samples: usize,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub classifier: String,
    pub best_score: f64,
    pub best_params: ParamSet,
    pub candidates: Vec<CandidateResult>,
    pub final_model: FinalModel,
    pub artifact_path: PathBuf,
    pub elapsed: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainingResults<'a> {
    classifier: &'a str,
    problem_type: &'a str,
    best_score: f64,
    best_params: serde_json::Value,
    extended_training: bool,
    big_classifier_score: Option<f64>,
    artifact_path: String,
}

/// Trains one classifier kind end to end
pub struct Trainer<'c, W: Write> {
    config: TrainerConfig,
    capabilities: Capabilities,
    channel: &'c mut ParentChannel<W>,
    /// Every fit of the run happens on these `numCPUs` workers
    pool: Arc<rayon::ThreadPool>,
    started: Instant,
}

impl<'c, W: Write> Trainer<'c, W> {
    /// Resolve the classifier kind; fails for unknown kinds and unsupported
    /// problem types
    pub fn new(
        config: TrainerConfig,
        registry: &ClassifierRegistry,
        channel: &'c mut ParentChannel<W>,
    ) -> Result<Self> {
        let capabilities = *registry.lookup(&config.classifier, config.problem_type)?;
        let pool = Arc::new(worker_pool(config.global.n_jobs())?);
        Ok(Self {
            config,
            capabilities,
            channel,
            pool,
            started: Instant::now(),
        })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            dev: self.config.dev(),
            random_state: self.config.random_state,
        }
    }

    /// Run every stage and persist the result
    pub fn run(mut self) -> Result<TrainingOutcome> {
        self.started = Instant::now();
        info!(
            classifier = %self.config.classifier,
            problem = %self.config.problem_type,
            dev = self.config.dev(),
            "Starting training"
        );

        let dataset = self.load_dataset()?;
        let split = self.split(&dataset)?;
        let x_train = self.prepare_features(&split.x_train);
        let y_train = dataset.targets.y.select(Axis(0), &split.train_indices);

        let search = self.search(&x_train, &y_train)?;
        self.report_elapsed();

        let final_model = self.finalize(&search, &dataset)?;
        let artifact_path = self.persist(&final_model, &search, &dataset)?;

        self.channel.message(
            TRAINING_RESULTS,
            &TrainingResults {
                classifier: &self.config.classifier,
                problem_type: self.config.problem_type.as_str(),
                best_score: search.best_score,
                best_params: params_to_json(&search.best_params),
                extended_training: final_model.extended,
                big_classifier_score: final_model.big_score,
                artifact_path: artifact_path.display().to_string(),
            },
        );

        let elapsed = self.started.elapsed();
        info!(elapsed = ?elapsed, path = %artifact_path.display(), "Training finished");

        Ok(TrainingOutcome {
            classifier: self.config.classifier.clone(),
            best_score: search.best_score,
            best_params: search.best_params,
            candidates: search.candidates,
            final_model,
            artifact_path,
            elapsed,
        })
    }

    /// Load features and labels and encode the targets.
    ///
    /// Kinds whose tag starts with `clnn` read the normalized feature file.
    pub fn load_dataset(&mut self) -> Result<Dataset> {
        let normalized = self.capabilities.uses_normalized_features();
        let features_path = self.config.files.features(normalized)?.to_path_buf();
        let labels_path = self.config.files.labels()?.to_path_buf();

        let features = load_features(&features_path, self.channel)?;
        let labels = load_labels(&labels_path)?;
        if features.matrix.nrows() != labels.len() {
            return Err(GridfitError::ShapeError {
                expected: format!("{} labels (one per feature row)", features.matrix.nrows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        if let FeatureSource::Csv { fallback, .. } = &features.source {
            debug!(reason = %fallback, "Features were read as CSV");
        }

        let targets = encode_targets(&labels, self.config.problem_type)?;
        info!(
            rows = features.matrix.nrows(),
            cols = features.matrix.ncols(),
            sparse = features.matrix.is_sparse(),
            classes = targets.classes.len(),
            "Dataset loaded"
        );
        Ok(Dataset {
            features,
            labels,
            targets,
        })
    }

    /// Seeded train/test split; dev mode keeps 1% for training
    pub fn split(&self, dataset: &Dataset) -> Result<Split> {
        let mode = SplitMode::from_dev(self.config.dev());
        let split = train_test_split(
            &dataset.features.matrix,
            &dataset.labels,
            mode.test_size(),
            self.config.random_state,
        )?;
        info!(
            train = split.train_indices.len(),
            test = split.test_indices.len(),
            ?mode,
            "Split dataset"
        );
        Ok(split)
    }

    /// Dense features in the representation this kind trains on.
    ///
    /// A failed adaptation falls back to the plain dense matrix.
    pub fn prepare_features(&self, x: &FeatureMatrix) -> Array2<f64> {
        match self.capabilities.adapt(x) {
            Some(Adaptation::Adapted(adapted)) => {
                debug!(kind = self.capabilities.kind(), "Using adapted feature layout");
                adapted
            }
            Some(Adaptation::Fallback { reason }) => {
                warn!(%reason, "Feature adaptation failed, using features as loaded");
                x.to_dense()
            }
            None => x.to_dense(),
        }
    }

    /// The grid for this kind, from an override file when one exists
    pub fn param_grid(&self, shape: &DatasetShape) -> Result<ParamGrid> {
        if let Some(dir) = self.config.param_override_dir() {
            if let Some(grid) = ParamGrid::load_override(&dir, &self.config.classifier)? {
                info!(dir = %dir.display(), "Using parameter grid override");
                return Ok(grid);
            }
        }
        Ok(self
            .capabilities
            .param_grid(self.config.problem_type, shape, self.config.dev()))
    }

    /// Announce the search space, run the search and report the winner
    pub fn search(
        &mut self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
    ) -> Result<GridSearchResult<Model>> {
        let shape = DatasetShape {
            n_samples: x_train.nrows(),
            n_features: x_train.ncols(),
            cv_folds: self.config.cv_folds,
        };
        let grid = self.param_grid(&shape)?;

        self.channel.print("*".repeat(60));
        self.channel
            .print("we are about to run a grid search over the following space:");
        self.channel.print_value(&grid.to_json());

        let estimator = self
            .capabilities
            .construct(self.config.problem_type, &self.build_options());
        let result = GridSearch::new(estimator, grid)
            .with_cv(self.config.cv_folds)
            .with_pool(Arc::clone(&self.pool))
            .fit(x_train, y_train)?;

        let failed = result.n_failed_fits();
        if failed > 0 {
            let total: usize = result.candidates.iter().map(|c| c.cv.scores.len()).sum();
            self.channel.print(format!(
                "{} of {} fits failed and were scored 0",
                failed, total
            ));
        }

        self.channel.print("this estimator's best prediction is:");
        self.channel.print_value(&result.best_score);
        self.channel.print("this estimator's best parameters are:");
        self.channel.print_value(&params_to_json(&result.best_params));
        Ok(result)
    }

    fn report_elapsed(&mut self) {
        let minutes = self.started.elapsed().as_secs_f64() / 60.0;
        self.channel.print("total training time for this classifier:");
        self.channel.print_value(&((minutes * 10.0).round() / 10.0));
    }

    /// Pick the model to persist.
    ///
    /// Kinds with extended training build their big model, apply the best
    /// parameters and fit it on every row of the dataset; the others keep
    /// the search's best estimator as is.
    pub fn finalize(
        &mut self,
        search: &GridSearchResult<Model>,
        dataset: &Dataset,
    ) -> Result<FinalModel> {
        let problem = self.config.problem_type;
        let Some(mut big) = self
            .capabilities
            .construct_big(problem, &self.build_options())
        else {
            return Ok(FinalModel {
                model: search.best_estimator.clone(),
                extended: false,
                big_score: None,
                n_training_samples: self.n_search_rows(dataset)?,
            });
        };

        let x_full = self.prepare_features(&dataset.features.matrix);
        let y_full = &dataset.targets.y;

        big.set_params(&search.best_params)?;
        let score = fit_and_score(&self.pool, &mut big, &x_full, y_full)?;
        warn!(
            score,
            "Big classifier is scored on the rows it was trained on; this is not a held-out estimate"
        );

        self.channel.print(format!(
            "the bigger {} has the following score on the full dataset:",
            self.config.classifier
        ));
        self.channel.print_value(&score);

        Ok(FinalModel {
            model: big,
            extended: true,
            big_score: Some(score),
            n_training_samples: dataset.n_samples(),
        })
    }

    /// Rows the search's refit trained on
    fn n_search_rows(&self, dataset: &Dataset) -> Result<usize> {
        let test_size = SplitMode::from_dev(self.config.dev()).test_size();
        Ok(split_sizes(dataset.n_samples(), test_size)?.0)
    }

    /// Write the artifact, replacing any previous one for this kind
    pub fn persist(
        &self,
        final_model: &FinalModel,
        search: &GridSearchResult<Model>,
        dataset: &Dataset,
    ) -> Result<PathBuf> {
        let path = artifact_path(
            &self.config.output_root,
            &self.config.classifier,
            self.config.format,
        );

        let mut metadata = ModelMetadata::new(&self.config.classifier, self.config.problem_type)
            .with_model_type(final_model.model.model_type())
            .with_training_shape(final_model.n_training_samples, dataset.n_features())
            .with_classes(dataset.targets.classes.iter().map(|c| c.to_string()).collect())
            .with_extended_training(final_model.extended)
            .add_metric("cv_score", search.best_score);
        for (name, value) in &search.best_params {
            metadata = metadata.add_hyperparameter(name, value);
        }
        if let Some(score) = final_model.big_score {
            metadata = metadata.add_metric("full_data_score", score);
        }

        save_artifact(&final_model.model, &metadata, &path, self.config.format)?;
        Ok(path)
    }
}

/// Fit on all rows and score on the same rows, inside `pool`
fn fit_and_score<E: Estimator>(
    pool: &rayon::ThreadPool,
    estimator: &mut E,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<f64> {
    pool.install(|| {
        estimator.fit(x, y)?;
        estimator.score(x, y)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ParamValue;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default)]
    struct ThreadRecorder {
        seen: Arc<Mutex<Vec<usize>>>,
    }

    impl Estimator for ThreadRecorder {
        fn set_param(&mut self, _name: &str, _value: &ParamValue) -> Result<()> {
            Ok(())
        }

        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            self.seen.lock().unwrap().push(rayon::current_num_threads());
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            self.seen.lock().unwrap().push(rayon::current_num_threads());
            Ok(Array1::zeros(x.nrows()))
        }

        fn is_classifier(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_big_fit_and_score_stay_on_the_pool() {
        let pool = worker_pool(1).unwrap();
        let mut recorder = ThreadRecorder::default();
        let x = Array2::zeros((4, 2));
        let y = Array1::zeros(4);

        let score = fit_and_score(&pool, &mut recorder, &x, &y).unwrap();

        assert_eq!(score, 1.0);
        assert_eq!(recorder.seen.lock().unwrap().clone(), vec![1, 1]);
    }
}
