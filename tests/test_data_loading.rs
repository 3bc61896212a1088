//! Integration test: feature files, label files and the split

mod common;

use common::{blobs, config, write_dataset, write_features};
use gridfit::config::ProblemType;
use gridfit::data::{
    load_features, save_csr, train_test_split, CsrMatrix, FeatureSource, Labels, SparseFallback,
    SplitMode,
};
use gridfit::messaging::{decode_lines, ParentChannel};
use gridfit::pipeline::Trainer;
use gridfit::training::ClassifierRegistry;
use ndarray::Array2;

#[test]
fn test_csv_with_n_lines_gives_n_minus_one_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("X_train.csv");
    let (rows, _) = blobs(25);
    write_features(&path, &rows);

    let text = std::fs::read_to_string(&path).unwrap();
    let n_lines = text.lines().count();
    let mut channel = ParentChannel::new(Vec::new());
    let loaded = load_features(&path, &mut channel).unwrap();

    assert_eq!(loaded.matrix.nrows(), n_lines - 1);
    assert!(channel.get_ref().is_empty());
}

#[test]
fn test_sparse_file_is_preferred_over_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("X_train.csv");
    let dense = Array2::from_shape_fn((6, 4), |(i, j)| if (i + j) % 3 == 0 { 1.5 } else { 0.0 });
    save_csr(&CsrMatrix::from_dense(&dense), &path).unwrap();

    let mut channel = ParentChannel::new(Vec::new());
    let loaded = load_features(&path, &mut channel).unwrap();

    assert_eq!(loaded.source, FeatureSource::Sparse);
    assert!(loaded.matrix.is_sparse());
    assert_eq!(loaded.matrix.to_dense(), dense);
}

#[test]
fn test_bad_cells_reach_the_parent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("X_train.csv");
    std::fs::write(&path, "age,income\n31,1000\nn/a,2000\n45,?\n").unwrap();

    let mut channel = ParentChannel::new(Vec::new());
    let loaded = load_features(&path, &mut channel).unwrap();

    match &loaded.source {
        FeatureSource::Csv {
            fallback,
            coercion_failures,
            ..
        } => {
            assert_eq!(*fallback, SparseFallback::NotSparse);
            assert_eq!(coercion_failures.len(), 2);
        }
        FeatureSource::Sparse => panic!("CSV loaded as sparse"),
    }
    let texts: Vec<String> = decode_lines(channel.get_ref())
        .iter()
        .map(|l| l["text"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(texts, vec!["age", "n/a", "income", "?"]);
}

#[test]
fn test_split_is_reproducible_for_a_seed() {
    let dense = Array2::from_shape_fn((100, 2), |(i, j)| (i + j) as f64);
    let x = gridfit::data::FeatureMatrix::Dense(dense);
    let y = Labels::from_numeric(&(0..100).map(|i| (i % 3) as f64).collect::<Vec<_>>());

    let a = train_test_split(&x, &y, SplitMode::Normal.test_size(), 0).unwrap();
    let b = train_test_split(&x, &y, SplitMode::Normal.test_size(), 0).unwrap();
    let c = train_test_split(&x, &y, SplitMode::Normal.test_size(), 1).unwrap();

    assert_eq!(a.train_indices, b.train_indices);
    assert_ne!(a.train_indices, c.train_indices);
    assert_eq!(a.train_indices.len(), 50);
}

#[test]
fn test_nn_kinds_read_the_normalized_file() {
    let dir = tempfile::tempdir().unwrap();
    let (rows, labels) = blobs(30);
    let mut files = write_dataset(dir.path(), &rows, &labels);
    // only the normalized file has a third column
    let nn_path = dir.path().join("X_train_nn.csv");
    let mut text = String::from("a,b,c\n");
    for row in &rows {
        text.push_str(&format!("{},{},0\n", row[0], row[1]));
    }
    std::fs::write(&nn_path, text).unwrap();
    files.x_train_nn = Some(nn_path);

    let registry = ClassifierRegistry::standard();
    let mut channel = ParentChannel::new(Vec::new());

    let cfg = config(files.clone(), "clnnMLP", ProblemType::Category, dir.path().into(), false);
    let mut trainer = Trainer::new(cfg, &registry, &mut channel).unwrap();
    assert_eq!(trainer.load_dataset().unwrap().n_features(), 3);

    let cfg = config(files, "clKNeighbors", ProblemType::Category, dir.path().into(), false);
    let mut trainer = Trainer::new(cfg, &registry, &mut channel).unwrap();
    assert_eq!(trainer.load_dataset().unwrap().n_features(), 2);
}
