//! Shared fixtures for integration tests

#![allow(dead_code)]

use gridfit::config::{FileNames, GlobalArgs, ProblemType, TrainerConfig};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Two well separated classes on two features, alternating rows
pub fn blobs(n: usize) -> (Vec<[f64; 2]>, Vec<f64>) {
    let rows = (0..n)
        .map(|i| {
            let base = if i % 2 == 0 { 0.0 } else { 10.0 };
            [base + (i % 7) as f64 * 0.3, base - (i % 5) as f64 * 0.2]
        })
        .collect();
    let labels = (0..n).map(|i| (i % 2) as f64).collect();
    (rows, labels)
}

/// y = 3·x0 - x1 on a deterministic grid of points
pub fn linear(n: usize) -> (Vec<[f64; 2]>, Vec<f64>) {
    let rows: Vec<[f64; 2]> = (0..n)
        .map(|i| [(i % 13) as f64, (i % 7) as f64 * 0.5])
        .collect();
    let labels = rows.iter().map(|r| 3.0 * r[0] - r[1]).collect();
    (rows, labels)
}

pub fn write_features(path: &Path, rows: &[[f64; 2]]) {
    let mut text = String::from("f0,f1\n");
    for row in rows {
        writeln!(text, "{},{}", row[0], row[1]).unwrap();
    }
    std::fs::write(path, text).unwrap();
}

pub fn write_labels(path: &Path, labels: &[f64]) {
    let mut text = String::from("label\n");
    for label in labels {
        writeln!(text, "{}", label).unwrap();
    }
    std::fs::write(path, text).unwrap();
}

/// Feature and label files in `dir`, same features for both variants
pub fn write_dataset(dir: &Path, rows: &[[f64; 2]], labels: &[f64]) -> FileNames {
    let x = dir.join("X_train.csv");
    let x_nn = dir.join("X_train_nn.csv");
    let y = dir.join("y_train.csv");
    write_features(&x, rows);
    write_features(&x_nn, rows);
    write_labels(&y, labels);
    FileNames {
        x_train: Some(x),
        x_train_nn: Some(x_nn),
        y_train: Some(y),
    }
}

pub fn config(
    files: FileNames,
    classifier: &str,
    problem: ProblemType,
    output_root: PathBuf,
    dev: bool,
) -> TrainerConfig {
    let global = GlobalArgs {
        pp_complete_location: None,
        num_cpus: Some(2),
        dev,
    };
    TrainerConfig::new(global, files, classifier, problem).with_output_root(output_root)
}
