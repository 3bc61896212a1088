//! Dataset loading, representation and splitting
//!
//! - [`loader`] - feature and label files (sparse first, CSV fallback)
//! - [`sparse`] - CSR matrices and their file format
//! - [`labels`] - label values and target encoding
//! - [`split`] - seeded train/test partitioning

pub mod labels;
pub mod loader;
pub mod sparse;
pub mod split;

pub use labels::{encode_targets, EncodedTargets, LabelValue, Labels};
pub use loader::{load_features, load_labels, CoercionFailure, FeatureSource, LoadedFeatures};
pub use sparse::{save_csr, try_load_csr, CsrMatrix, SparseFallback};
pub use split::{train_test_split, Split, SplitMode};

use ndarray::{Array2, Axis, ShapeBuilder};

/// Feature matrix, rows are samples
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureMatrix {
    Sparse(CsrMatrix),
    Dense(Array2<f64>),
}

impl FeatureMatrix {
    pub fn nrows(&self) -> usize {
        match self {
            FeatureMatrix::Sparse(m) => m.nrows(),
            FeatureMatrix::Dense(m) => m.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            FeatureMatrix::Sparse(m) => m.ncols(),
            FeatureMatrix::Dense(m) => m.ncols(),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, FeatureMatrix::Sparse(_))
    }

    /// Rows in the given order
    pub fn select_rows(&self, rows: &[usize]) -> FeatureMatrix {
        match self {
            FeatureMatrix::Sparse(m) => FeatureMatrix::Sparse(m.select_rows(rows)),
            FeatureMatrix::Dense(m) => FeatureMatrix::Dense(m.select(Axis(0), rows)),
        }
    }

    /// Row-major dense copy
    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            FeatureMatrix::Sparse(m) => m.to_dense(),
            FeatureMatrix::Dense(m) => m.clone(),
        }
    }
}

/// Outcome of an optional, estimator-specific data format adaptation
#[derive(Debug, Clone, PartialEq)]
pub enum Adaptation {
    /// The estimator gets its preferred representation
    Adapted(Array2<f64>),
    /// Adaptation failed; the original data is used as-is
    Fallback { reason: String },
}

impl Adaptation {
    pub fn is_adapted(&self) -> bool {
        matches!(self, Adaptation::Adapted(_))
    }
}

/// Column-major dense copy for column-scanning boosters.
///
/// Missing values (NaN) are allowed; infinite values are not, since split
/// thresholds between them are undefined.
pub fn to_column_major(x: &FeatureMatrix) -> Adaptation {
    let (rows, cols) = (x.nrows(), x.ncols());
    let dense = x.to_dense();

    if let Some(((row, col), value)) = dense.indexed_iter().find(|(_, v)| v.is_infinite()) {
        return Adaptation::Fallback {
            reason: format!("infinite value {} at row {}, column {}", value, row, col),
        };
    }

    let mut column_major = Array2::zeros((rows, cols).f());
    column_major.assign(&dense);
    Adaptation::Adapted(column_major)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_select_rows_matches_between_representations() {
        let dense = array![[1.0, 0.0], [0.0, 2.0], [3.0, 0.0]];
        let sparse = FeatureMatrix::Sparse(CsrMatrix::from_dense(&dense));
        let dense = FeatureMatrix::Dense(dense);

        assert_eq!(
            sparse.select_rows(&[2, 1]).to_dense(),
            dense.select_rows(&[2, 1]).to_dense()
        );
        assert_eq!(sparse.nrows(), 3);
        assert_eq!(sparse.ncols(), 2);
    }

    #[test]
    fn test_column_major_adaptation() {
        let x = FeatureMatrix::Dense(array![[1.0, 2.0], [3.0, f64::NAN]]);
        match to_column_major(&x) {
            Adaptation::Adapted(m) => {
                assert!(m.t().is_standard_layout());
                assert_eq!(m[[1, 0]], 3.0);
                assert!(m[[1, 1]].is_nan());
            }
            other => panic!("expected adaptation, got {:?}", other),
        }
    }

    #[test]
    fn test_adaptation_falls_back_on_infinity() {
        let x = FeatureMatrix::Dense(array![[1.0, f64::INFINITY]]);
        assert!(matches!(to_column_major(&x), Adaptation::Fallback { .. }));
    }
}
