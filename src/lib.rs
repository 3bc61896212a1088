//! gridfit - grid-search trainer for one classifier kind
//!
//! A parent pipeline launches one trainer per classifier kind. Each run
//! loads the prepared features and labels, holds out a test split, runs a
//! cross-validated grid search over the kind's hyperparameters, optionally
//! refits a bigger model on the full dataset, and writes the winner to
//! `bestClassifiers/best<kind>/`.
//!
//! # Modules
//!
//! - [`config`] - settings handed over by the parent
//! - [`messaging`] - JSON-lines channel back to the parent on stdout
//! - [`data`] - feature/label loading, target encoding, train/test split
//! - [`training`] - estimators, parameter grids, cross-validation, grid search
//!   and the classifier registry
//! - [`export`] - model artifacts
//! - [`pipeline`] - the trainer that ties the stages together
//! - [`cli`] - command-line entry

pub mod error;

pub mod config;
pub mod data;
pub mod messaging;
pub mod training;

pub mod export;
pub mod pipeline;

pub mod cli;

pub use error::{GridfitError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{GridfitError, Result};

    pub use crate::config::{FileNames, GlobalArgs, ProblemType, TrainerConfig};
    pub use crate::data::{FeatureMatrix, Labels, LoadedFeatures, Split};
    pub use crate::export::{load_artifact, ModelMetadata, SerializationFormat};
    pub use crate::messaging::ParentChannel;
    pub use crate::pipeline::{Trainer, TrainingOutcome};
    pub use crate::training::{
        ClassifierRegistry, Estimator, GridSearch, Model, ParamGrid, ParamSet, ParamValue,
    };
}
