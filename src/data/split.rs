//! Seeded train/test split

use super::labels::Labels;
use super::FeatureMatrix;
use crate::error::{GridfitError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Which split ratio to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Half of the data is held out
    Normal,
    /// Train on a tiny sample for fast iteration
    Dev,
}

impl SplitMode {
    pub fn from_dev(dev: bool) -> Self {
        if dev {
            SplitMode::Dev
        } else {
            SplitMode::Normal
        }
    }

    /// Fraction of rows placed in the test set
    pub fn test_size(&self) -> f64 {
        match self {
            SplitMode::Normal => 0.5,
            SplitMode::Dev => 0.99,
        }
    }
}

/// Disjoint train/test partition of a dataset
#[derive(Debug, Clone)]
pub struct Split {
    pub x_train: FeatureMatrix,
    pub x_test: FeatureMatrix,
    pub y_train: Labels,
    pub y_test: Labels,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Number of (train, test) rows for `n` samples
pub fn split_sizes(n: usize, test_size: f64) -> Result<(usize, usize)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(GridfitError::ValidationError(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }
    let n_test = (test_size * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_train == 0 || n_test == 0 {
        return Err(GridfitError::ValidationError(format!(
            "with n_samples={} and test_size={}, the resulting train set would be empty",
            n, test_size
        )));
    }
    Ok((n_train, n_test))
}

/// Partition rows into train and test sets.
///
/// The same seed always yields the same partition.
pub fn train_test_split(
    x: &FeatureMatrix,
    y: &Labels,
    test_size: f64,
    seed: u64,
) -> Result<Split> {
    let n = x.nrows();
    if n != y.len() {
        return Err(GridfitError::ShapeError {
            expected: format!("{} labels", n),
            actual: format!("{} labels", y.len()),
        });
    }

    let (_, n_test) = split_sizes(n, test_size)?;

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train_indices = indices[n_test..].to_vec();
    let test_indices = indices[..n_test].to_vec();

    Ok(Split {
        x_train: x.select_rows(&train_indices),
        x_test: x.select_rows(&test_indices),
        y_train: y.select(&train_indices),
        y_test: y.select(&test_indices),
        train_indices,
        test_indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn dataset(n: usize) -> (FeatureMatrix, Labels) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        let y: Vec<f64> = (0..n).map(|i| i as f64).collect();
        (FeatureMatrix::Dense(x), Labels::from_numeric(&y))
    }

    #[test]
    fn test_split_is_deterministic() {
        let (x, y) = dataset(50);
        let a = train_test_split(&x, &y, 0.5, 0).unwrap();
        let b = train_test_split(&x, &y, 0.5, 0).unwrap();
        assert_eq!(a.train_indices, b.train_indices);
        assert_eq!(a.test_indices, b.test_indices);
    }

    #[test]
    fn test_split_is_a_partition() {
        let (x, y) = dataset(37);
        let split = train_test_split(&x, &y, 0.5, 0).unwrap();

        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(split.test_indices.iter())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..37).collect::<Vec<_>>());
        assert_eq!(split.test_indices.len(), 19);
        assert_eq!(split.x_train.nrows(), 18);
        assert_eq!(split.y_train.len(), 18);
    }

    #[test]
    fn test_rows_stay_aligned_with_labels() {
        let (x, y) = dataset(20);
        let split = train_test_split(&x, &y, 0.5, 3).unwrap();
        let dense = split.x_train.to_dense();
        for (pos, &orig) in split.train_indices.iter().enumerate() {
            assert_eq!(dense[[pos, 0]], (orig * 2) as f64);
            assert_eq!(split.y_train.values()[pos], y.values()[orig]);
        }
    }

    #[test]
    fn test_mode_sizes() {
        assert_eq!(split_sizes(1000, SplitMode::Normal.test_size()).unwrap(), (500, 500));
        assert_eq!(split_sizes(1000, SplitMode::Dev.test_size()).unwrap(), (10, 990));
    }

    #[test]
    fn test_empty_train_set_is_rejected() {
        assert!(split_sizes(50, SplitMode::Dev.test_size()).is_err());
        assert!(split_sizes(10, 1.5).is_err());
    }
}
