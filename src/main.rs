//! gridfit - single-classifier grid-search trainer
//!
//! Logs go to stderr; stdout carries JSON-lines messages for the parent.

use clap::Parser;
use gridfit::cli::{cmd_train, Cli};
use tracing::error;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridfit=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = cmd_train(&cli) {
        error!(classifier = %cli.classifier, "Training failed: {:#}", e);
        std::process::exit(1);
    }
}
