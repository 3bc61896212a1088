//! Feature and label loading
//!
//! Feature files are tried as sparse matrices first and parsed as CSV
//! otherwise. CSV files written by the data-formatting step carry a header
//! row, which is discarded.

use super::labels::{LabelValue, Labels};
use super::sparse::{try_load_csr, SparseFallback};
use super::FeatureMatrix;
use crate::error::{GridfitError, Result};
use crate::messaging::ParentChannel;
use ndarray::Array2;
use polars::prelude::*;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A CSV cell that could not be read as a number
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionFailure {
    /// Data row, 0-based, header excluded
    pub row: usize,
    pub column: usize,
    pub header: String,
    /// Raw cell text
    pub value: String,
}

/// Where the feature matrix came from
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureSource {
    Sparse,
    Csv {
        /// Why the sparse attempt did not succeed
        fallback: SparseFallback,
        header: Vec<String>,
        coercion_failures: Vec<CoercionFailure>,
    },
}

/// Feature matrix plus how it was obtained
#[derive(Debug, Clone)]
pub struct LoadedFeatures {
    pub matrix: FeatureMatrix,
    pub source: FeatureSource,
}

impl LoadedFeatures {
    pub fn coercion_failures(&self) -> &[CoercionFailure] {
        match &self.source {
            FeatureSource::Csv { coercion_failures, .. } => coercion_failures,
            FeatureSource::Sparse => &[],
        }
    }
}

/// Load the feature matrix.
///
/// Cells that fail numeric coercion are reported to the parent as the
/// column header followed by the raw value, and stored as NaN.
pub fn load_features<W: Write>(
    path: impl AsRef<Path>,
    channel: &mut ParentChannel<W>,
) -> Result<LoadedFeatures> {
    let path = path.as_ref();
    let start = Instant::now();

    let fallback = match try_load_csr(path) {
        Ok(csr) => {
            info!(
                path = %path.display(),
                rows = csr.nrows(),
                cols = csr.ncols(),
                nnz = csr.nnz(),
                "Loaded sparse features"
            );
            return Ok(LoadedFeatures {
                matrix: FeatureMatrix::Sparse(csr),
                source: FeatureSource::Sparse,
            });
        }
        Err(reason) => reason,
    };
    debug!(path = %path.display(), reason = %fallback, "Sparse load failed, reading CSV");

    let df = read_text_csv(path)?;
    let header: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let columns = text_columns(&df)?;

    let (n_rows, n_cols) = (df.height(), columns.len());
    let mut matrix = Array2::from_elem((n_rows, n_cols), f64::NAN);
    let mut coercion_failures = Vec::new();

    for row in 0..n_rows {
        for (col, values) in columns.iter().enumerate() {
            let raw = values.get(row).unwrap_or("");
            match raw.trim().parse::<f64>() {
                Ok(v) => matrix[[row, col]] = v,
                Err(_) => {
                    channel.print(&header[col]);
                    channel.print(raw);
                    coercion_failures.push(CoercionFailure {
                        row,
                        column: col,
                        header: header[col].clone(),
                        value: raw.to_string(),
                    });
                }
            }
        }
    }

    if !coercion_failures.is_empty() {
        warn!(
            count = coercion_failures.len(),
            "Feature cells could not be read as numbers and were stored as NaN"
        );
    }
    info!(
        path = %path.display(),
        rows = n_rows,
        cols = n_cols,
        elapsed = ?start.elapsed(),
        "Loaded CSV features"
    );

    Ok(LoadedFeatures {
        matrix: FeatureMatrix::Dense(matrix),
        source: FeatureSource::Csv {
            fallback,
            header,
            coercion_failures,
        },
    })
}

/// Load the label vector from the first column of a CSV file.
///
/// Values that are not numbers are kept as raw text.
pub fn load_labels(path: impl AsRef<Path>) -> Result<Labels> {
    let path = path.as_ref();
    let df = read_text_csv(path)?;
    let columns = text_columns(&df)?;
    let first = columns.first().ok_or_else(|| {
        GridfitError::DataError(format!("label file {} has no columns", path.display()))
    })?;

    let labels = Labels::new(
        first
            .into_iter()
            .map(|cell| LabelValue::parse(cell.unwrap_or("")))
            .collect(),
    );

    info!(path = %path.display(), rows = labels.len(), raw = labels.n_raw(), "Loaded labels");
    Ok(labels)
}

/// Read a headed CSV with every column kept as text
fn read_text_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| GridfitError::DataError(format!("{}: {}", path.display(), e)))?
        .finish()
        .map_err(|e| GridfitError::DataError(format!("{}: {}", path.display(), e)))?;
    Ok(df)
}

fn text_columns(df: &DataFrame) -> Result<Vec<StringChunked>> {
    df.get_columns()
        .iter()
        .map(|column| {
            let text = column.cast(&DataType::String)?;
            Ok(text.str()?.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::decode_lines;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_csv_header_is_discarded() {
        let file = write_csv("a,b,c\n1,2,3\n4,5,6\n7,8,9\n");
        let mut channel = ParentChannel::new(Vec::new());

        let loaded = load_features(file.path(), &mut channel).unwrap();

        assert_eq!(loaded.matrix.nrows(), 3);
        assert_eq!(loaded.matrix.ncols(), 3);
        assert_eq!(loaded.matrix.to_dense()[[2, 1]], 8.0);
        match loaded.source {
            FeatureSource::Csv { fallback, header, .. } => {
                assert_eq!(fallback, SparseFallback::NotSparse);
                assert_eq!(header, vec!["a", "b", "c"]);
            }
            FeatureSource::Sparse => panic!("CSV file loaded as sparse"),
        }
    }

    #[test]
    fn test_scientific_notation() {
        let file = write_csv("x,y\n1e-3,2.5E2\n");
        let mut channel = ParentChannel::new(Vec::new());
        let dense = load_features(file.path(), &mut channel).unwrap().matrix.to_dense();
        assert_eq!(dense[[0, 0]], 0.001);
        assert_eq!(dense[[0, 1]], 250.0);
    }

    #[test]
    fn test_bad_cell_is_reported_not_fatal() {
        let file = write_csv("height,width\n1.0,2.0\nabc,4.0\n");
        let mut channel = ParentChannel::new(Vec::new());

        let loaded = load_features(file.path(), &mut channel).unwrap();

        assert_eq!(loaded.matrix.nrows(), 2);
        let failures = loaded.coercion_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].row, 1);
        assert_eq!(failures[0].header, "height");
        assert_eq!(failures[0].value, "abc");
        assert!(loaded.matrix.to_dense()[[1, 0]].is_nan());

        let lines = decode_lines(channel.get_ref());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["text"], "height");
        assert_eq!(lines[1]["text"], "abc");
    }

    #[test]
    fn test_labels_skip_header_and_keep_raw() {
        let file = write_csv("label\n1\n0\nmaybe\n");
        let labels = load_labels(file.path()).unwrap();

        assert_eq!(labels.len(), 3);
        assert_eq!(labels.values()[0], LabelValue::Numeric(1.0));
        assert_eq!(labels.values()[2], LabelValue::Raw("maybe".to_string()));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let mut channel = ParentChannel::new(Vec::new());
        let result = load_features("/nonexistent/gridfit/X_train.csv", &mut channel);
        assert!(matches!(result, Err(GridfitError::DataError(_))));
    }
}
