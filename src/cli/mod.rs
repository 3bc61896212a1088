//! Command-line interface
//!
//! The parent pipeline launches one trainer per classifier kind with four
//! positional arguments: the global settings JSON, the file names JSON, the
//! kind tag and the problem type. Stdout belongs to the parent channel, so
//! nothing here prints directly.

use clap::Parser;
use std::path::PathBuf;

use crate::config::TrainerConfig;
use crate::export::SerializationFormat;
use crate::messaging::ParentChannel;
use crate::pipeline::{Trainer, TrainingOutcome};
use crate::training::ClassifierRegistry;

#[derive(Parser, Debug)]
#[command(name = "gridfit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Grid-search one classifier kind and persist the best model")]
#[command(long_about = None)]
pub struct Cli {
    /// Global settings as JSON (ppCompleteLocation, numCPUs, dev)
    pub global_args: String,

    /// Known file paths as JSON (X_train, X_train_nn, y_train)
    pub file_names: String,

    /// Classifier kind, e.g. clRandomForest
    pub classifier: String,

    /// Problem type (category, regression)
    pub problem_type: String,

    /// Directory that receives bestClassifiers/ (defaults to <ppCompleteLocation>/pySetup)
    #[arg(long)]
    pub output_root: Option<PathBuf>,

    /// Artifact format (binary, json)
    #[arg(long, default_value = "binary")]
    pub format: String,

    /// Number of cross-validation folds
    #[arg(long, default_value = "5")]
    pub cv_folds: usize,

    /// Seed for the train/test split and the estimators
    #[arg(long, default_value = "0")]
    pub seed: u64,
}

impl Cli {
    /// Build the trainer configuration from the parsed arguments
    pub fn to_config(&self) -> anyhow::Result<TrainerConfig> {
        let format: SerializationFormat = self.format.parse()?;
        let mut config = TrainerConfig::from_args(
            &self.global_args,
            &self.file_names,
            &self.classifier,
            &self.problem_type,
        )?
        .with_cv(self.cv_folds)
        .with_random_state(self.seed)
        .with_format(format);

        if let Some(root) = &self.output_root {
            config = config.with_output_root(root);
        }
        Ok(config)
    }
}

/// Train with the standard registry, reporting to the parent on stdout
pub fn cmd_train(cli: &Cli) -> anyhow::Result<TrainingOutcome> {
    let config = cli.to_config()?;
    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::stdout();

    let outcome = Trainer::new(config, &registry, &mut channel)?.run()?;
    Ok(outcome)
}
