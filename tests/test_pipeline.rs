//! Integration test: trainer runs end to end

mod common;

use common::{blobs, config, linear, write_dataset};
use gridfit::config::ProblemType;
use gridfit::error::GridfitError;
use gridfit::export::{load_artifact, SerializationFormat};
use gridfit::messaging::{decode_lines, ParentChannel};
use gridfit::pipeline::{Trainer, TRAINING_RESULTS};
use gridfit::training::{ClassifierRegistry, Estimator, Model, ParamValue};
use serde_json::Value;
use std::path::PathBuf;

fn console_texts(lines: &[Value]) -> Vec<Value> {
    lines
        .iter()
        .filter(|l| l["type"] == "console.log")
        .map(|l| l["text"].clone())
        .collect()
}

fn training_results(lines: &[Value]) -> Value {
    lines
        .iter()
        .find(|l| l["type"] == TRAINING_RESULTS)
        .map(|l| l["text"].clone())
        .expect("no trainingResults message")
}

#[test]
fn test_knn_category_run() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = blobs(60);
    let files = write_dataset(dir.path(), &rows, &labels);
    let root = dir.path().join("out");
    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::new(Vec::new());

    let cfg = config(files, "clKNeighbors", ProblemType::Category, root.clone(), false);
    let outcome = Trainer::new(cfg, &registry, &mut channel)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(
        outcome.artifact_path,
        root.join("bestClassifiers/bestclKNeighbors/bestclKNeighbors.bin")
    );
    assert!(outcome.artifact_path.is_file());
    assert!(!outcome.final_model.extended);
    assert!(outcome.final_model.big_score.is_none());
    assert_eq!(outcome.best_score, 1.0);

    let (model, metadata) = load_artifact::<Model>(&outcome.artifact_path).unwrap();
    assert_eq!(model.model_type(), "KNearestNeighbors");
    assert_eq!(metadata.n_training_samples, 30);
    assert_eq!(metadata.n_features, 2);
    assert_eq!(metadata.classes, vec!["0", "1"]);
    assert!(!metadata.extended_training);

    let lines = decode_lines(channel.get_ref());
    let texts = console_texts(&lines);
    let announce = texts
        .iter()
        .position(|t| t == "we are about to run a grid search over the following space:")
        .expect("search space was not announced");
    assert!(texts[announce + 1]["n_neighbors"].is_array());
    assert!(texts.contains(&Value::from("this estimator's best prediction is:")));
    assert!(texts.contains(&Value::from("this estimator's best parameters are:")));
    assert!(texts.contains(&Value::from("total training time for this classifier:")));

    let results = training_results(&lines);
    assert_eq!(results["classifier"], "clKNeighbors");
    assert_eq!(results["problemType"], "category");
    assert_eq!(results["extendedTraining"], false);
    assert!(results["bigClassifierScore"].is_null());
}

#[test]
fn test_random_forest_extended_training_uses_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = blobs(60);
    let files = write_dataset(dir.path(), &rows, &labels);
    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::new(Vec::new());

    let cfg = config(
        files,
        "clRandomForest",
        ProblemType::Category,
        dir.path().join("out"),
        false,
    );
    let outcome = Trainer::new(cfg, &registry, &mut channel)
        .unwrap()
        .run()
        .unwrap();

    assert!(outcome.final_model.extended);
    assert_eq!(outcome.final_model.n_training_samples, 60);
    assert!(outcome.final_model.big_score.is_some());

    let (model, metadata) = load_artifact::<Model>(&outcome.artifact_path).unwrap();
    assert!(metadata.extended_training);
    assert_eq!(metadata.n_training_samples, 60);
    assert!(metadata.metrics.contains_key("full_data_score"));
    match model {
        Model::RandomForest(rf) => assert_eq!(rf.n_trees(), 500),
        other => panic!("unexpected model {}", other.model_type()),
    }

    let results = training_results(&decode_lines(channel.get_ref()));
    assert_eq!(results["extendedTraining"], true);
    assert!(results["bigClassifierScore"].is_number());
}

#[test]
fn test_xgboost_regression_run() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = linear(80);
    let files = write_dataset(dir.path(), &rows, &labels);
    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::new(Vec::new());

    let cfg = config(
        files,
        "clXGBoost",
        ProblemType::Regression,
        dir.path().join("out"),
        false,
    );
    let outcome = Trainer::new(cfg, &registry, &mut channel)
        .unwrap()
        .run()
        .unwrap();

    assert!(outcome.final_model.extended);
    assert_eq!(outcome.final_model.n_training_samples, 80);
    assert!(outcome.best_score > 0.5, "cv r2 was {}", outcome.best_score);
    assert_eq!(outcome.final_model.model.model_type(), "GradientBoostedTrees");
}

#[test]
fn test_non_extended_kind_persists_best_estimator() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = blobs(40);
    let files = write_dataset(dir.path(), &rows, &labels);
    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::new(Vec::new());

    let cfg = config(
        files,
        "clLogisticRegression",
        ProblemType::Category,
        dir.path().join("out"),
        false,
    );
    let mut trainer = Trainer::new(cfg, &registry, &mut channel).unwrap();
    let dataset = trainer.load_dataset().unwrap();
    let split = trainer.split(&dataset).unwrap();
    let x_train = trainer.prepare_features(&split.x_train);
    let y_train = dataset.targets.y.select(ndarray::Axis(0), &split.train_indices);
    let search = trainer.search(&x_train, &y_train).unwrap();
    let final_model = trainer.finalize(&search, &dataset).unwrap();

    assert!(!final_model.extended);
    assert_eq!(final_model.n_training_samples, 20);
    assert_eq!(
        bincode::serialize(&final_model.model).unwrap(),
        bincode::serialize(&search.best_estimator).unwrap()
    );

    let path = trainer.persist(&final_model, &search, &dataset).unwrap();
    let (loaded, _) = load_artifact::<Model>(&path).unwrap();
    assert_eq!(
        loaded.predict(&x_train).unwrap(),
        search.best_estimator.predict(&x_train).unwrap()
    );
}

#[test]
fn test_dev_mode_trains_on_one_percent() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = blobs(1000);
    let files = write_dataset(dir.path(), &rows, &labels);
    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::new(Vec::new());

    let cfg = config(
        files,
        "clKNeighbors",
        ProblemType::Category,
        dir.path().join("out"),
        true,
    );
    let mut trainer = Trainer::new(cfg, &registry, &mut channel).unwrap();
    let dataset = trainer.load_dataset().unwrap();
    let split = trainer.split(&dataset).unwrap();
    assert_eq!(split.train_indices.len(), 10);
    assert_eq!(split.test_indices.len(), 990);
}

#[test]
fn test_rerun_overwrites_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = blobs(40);
    let files = write_dataset(dir.path(), &rows, &labels);
    let root = dir.path().join("out");
    let registry = ClassifierRegistry::standard();

    let mut first_time = None;
    for _ in 0..2 {
        let mut channel = ParentChannel::new(Vec::new());
        let cfg = config(files.clone(), "clKNeighbors", ProblemType::Category, root.clone(), false);
        let outcome = Trainer::new(cfg, &registry, &mut channel)
            .unwrap()
            .run()
            .unwrap();
        let (_, metadata) = load_artifact::<Model>(&outcome.artifact_path).unwrap();
        if let Some(previous) = first_time {
            assert!(metadata.trained_at >= previous);
        }
        first_time = Some(metadata.trained_at);
    }

    let entries: Vec<PathBuf> = std::fs::read_dir(root.join("bestClassifiers/bestclKNeighbors"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_json_artifact_format() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = blobs(40);
    let files = write_dataset(dir.path(), &rows, &labels);
    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::new(Vec::new());

    let cfg = config(
        files,
        "clKNeighbors",
        ProblemType::Category,
        dir.path().join("out"),
        false,
    )
    .with_format(SerializationFormat::Json);
    let outcome = Trainer::new(cfg, &registry, &mut channel)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(outcome.artifact_path.extension().unwrap(), "json");
    let text = std::fs::read_to_string(&outcome.artifact_path).unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["metadata"]["name"], "clKNeighbors");
    assert!(load_artifact::<Model>(&outcome.artifact_path).is_ok());
}

#[test]
fn test_parameter_override_replaces_grid() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = blobs(40);
    let files = write_dataset(dir.path(), &rows, &labels);
    let base = dir.path().join("pp");
    let overrides = base.join("pySetup/parameterMakers");
    std::fs::create_dir_all(&overrides).unwrap();
    std::fs::write(overrides.join("clKNeighbors.json"), r#"{"n_neighbors": [4]}"#).unwrap();

    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::new(Vec::new());
    let mut cfg = config(files, "clKNeighbors", ProblemType::Category, base.join("out"), false);
    cfg.global.pp_complete_location = Some(base);

    let outcome = Trainer::new(cfg, &registry, &mut channel)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(outcome.candidates.len(), 1);
    assert_eq!(outcome.best_params["n_neighbors"], ParamValue::Int(4));
}

#[test]
fn test_unknown_and_unsupported_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = blobs(20);
    let files = write_dataset(dir.path(), &rows, &labels);
    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::new(Vec::new());

    let cfg = config(files.clone(), "clMagic", ProblemType::Category, dir.path().into(), false);
    assert!(matches!(
        Trainer::new(cfg, &registry, &mut channel),
        Err(GridfitError::UnknownClassifier(_))
    ));

    let cfg = config(
        files,
        "clLogisticRegression",
        ProblemType::Regression,
        dir.path().into(),
        false,
    );
    assert!(matches!(
        Trainer::new(cfg, &registry, &mut channel),
        Err(GridfitError::UnsupportedProblemType { .. })
    ));
}

#[test]
fn test_label_count_mismatch_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = blobs(20);
    let files = write_dataset(dir.path(), &rows, &labels[..19]);
    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::new(Vec::new());

    let cfg = config(files, "clKNeighbors", ProblemType::Category, dir.path().into(), false);
    let result = Trainer::new(cfg, &registry, &mut channel).unwrap().run();
    assert!(matches!(result, Err(GridfitError::ShapeError { .. })));
}
