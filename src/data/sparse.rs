//! Compressed sparse row matrices and their on-disk format
//!
//! A CSR file is the magic bytes `GCSR` followed by a bincode-encoded
//! [`CsrMatrix`]. Loading never panics on foreign input: every failure is
//! returned as a [`SparseFallback`] so the caller can fall back to CSV.

use crate::error::{GridfitError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Magic bytes for sparse feature files
pub const CSR_MAGIC: [u8; 4] = [b'G', b'C', b'S', b'R'];

/// Row-compressed numeric matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    /// Non-zero values, row by row
    pub data: Vec<f64>,
    /// Column index of each value
    pub indices: Vec<usize>,
    /// Offsets into `data` for each row, `rows + 1` entries
    pub indptr: Vec<usize>,
    /// (rows, cols)
    pub shape: (usize, usize),
}

/// Why a file was not loaded as a sparse matrix
#[derive(Debug, Clone, PartialEq)]
pub enum SparseFallback {
    /// The file could not be read
    Io(String),
    /// The file does not start with the sparse magic bytes
    NotSparse,
    /// The payload could not be decoded
    Decode(String),
    /// The payload decoded but is not a consistent CSR matrix
    Invalid(String),
}

impl fmt::Display for SparseFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SparseFallback::Io(e) => write!(f, "unreadable: {}", e),
            SparseFallback::NotSparse => write!(f, "not a sparse matrix file"),
            SparseFallback::Decode(e) => write!(f, "corrupt sparse payload: {}", e),
            SparseFallback::Invalid(e) => write!(f, "inconsistent sparse matrix: {}", e),
        }
    }
}

impl CsrMatrix {
    /// Build a matrix from raw parts, checking consistency
    pub fn new(
        data: Vec<f64>,
        indices: Vec<usize>,
        indptr: Vec<usize>,
        shape: (usize, usize),
    ) -> Result<Self> {
        let matrix = Self { data, indices, indptr, shape };
        matrix.validate().map_err(GridfitError::ValidationError)?;
        Ok(matrix)
    }

    /// Compress a dense matrix, dropping exact zeros
    pub fn from_dense(dense: &Array2<f64>) -> Self {
        let mut data = Vec::new();
        let mut indices = Vec::new();
        let mut indptr = Vec::with_capacity(dense.nrows() + 1);
        indptr.push(0);

        for row in dense.rows() {
            for (col, &value) in row.iter().enumerate() {
                if value != 0.0 {
                    data.push(value);
                    indices.push(col);
                }
            }
            indptr.push(data.len());
        }

        Self {
            data,
            indices,
            indptr,
            shape: dense.dim(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let (rows, cols) = self.shape;
        if self.indptr.len() != rows + 1 {
            return Err(format!(
                "indptr has {} entries, expected {}",
                self.indptr.len(),
                rows + 1
            ));
        }
        if self.indptr[0] != 0 {
            return Err("indptr must start at 0".to_string());
        }
        if self.indptr.windows(2).any(|w| w[0] > w[1]) {
            return Err("indptr must be non-decreasing".to_string());
        }
        let nnz = self.indptr[rows];
        if nnz != self.data.len() || nnz != self.indices.len() {
            return Err(format!(
                "indptr ends at {} but there are {} values and {} indices",
                nnz,
                self.data.len(),
                self.indices.len()
            ));
        }
        if let Some(&bad) = self.indices.iter().find(|&&c| c >= cols) {
            return Err(format!("column index {} out of bounds for {} columns", bad, cols));
        }
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.shape.0
    }

    pub fn ncols(&self) -> usize {
        self.shape.1
    }

    /// Number of stored values
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Expand to a row-major dense matrix
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros(self.shape);
        for row in 0..self.nrows() {
            for k in self.indptr[row]..self.indptr[row + 1] {
                dense[[row, self.indices[k]]] = self.data[k];
            }
        }
        dense
    }

    /// New matrix made of the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut data = Vec::new();
        let mut indices = Vec::new();
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        indptr.push(0);

        for &row in rows {
            let range = self.indptr[row]..self.indptr[row + 1];
            data.extend_from_slice(&self.data[range.clone()]);
            indices.extend_from_slice(&self.indices[range]);
            indptr.push(data.len());
        }

        Self {
            data,
            indices,
            indptr,
            shape: (rows.len(), self.ncols()),
        }
    }
}

/// Write a matrix in the sparse file format
pub fn save_csr(matrix: &CsrMatrix, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&CSR_MAGIC)?;
    bincode::serialize_into(&mut writer, matrix)?;
    writer.flush()?;
    Ok(())
}

/// Try to read a sparse matrix file
pub fn try_load_csr(path: impl AsRef<Path>) -> std::result::Result<CsrMatrix, SparseFallback> {
    let mut bytes = Vec::new();
    File::open(path.as_ref())
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|e| SparseFallback::Io(e.to_string()))?;

    if bytes.len() < CSR_MAGIC.len() || bytes[..CSR_MAGIC.len()] != CSR_MAGIC {
        return Err(SparseFallback::NotSparse);
    }

    let matrix: CsrMatrix = bincode::deserialize(&bytes[CSR_MAGIC.len()..])
        .map_err(|e| SparseFallback::Decode(e.to_string()))?;
    matrix.validate().map_err(SparseFallback::Invalid)?;
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_dense_and_back() {
        let dense = array![[1.0, 0.0, 2.0], [0.0, 0.0, 0.0], [0.0, 3.0, 0.0]];
        let csr = CsrMatrix::from_dense(&dense);

        assert_eq!(csr.nnz(), 3);
        assert_eq!(csr.indptr, vec![0, 2, 2, 3]);
        assert_eq!(csr.to_dense(), dense);
    }

    #[test]
    fn test_select_rows() {
        let dense = array![[1.0, 0.0], [0.0, 2.0], [3.0, 4.0]];
        let csr = CsrMatrix::from_dense(&dense);
        let picked = csr.select_rows(&[2, 0]);

        assert_eq!(picked.shape, (2, 2));
        assert_eq!(picked.to_dense(), array![[3.0, 4.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_new_rejects_inconsistent_parts() {
        let bad_indptr = CsrMatrix::new(vec![1.0], vec![0], vec![0, 2], (1, 1));
        assert!(bad_indptr.is_err());

        let bad_column = CsrMatrix::new(vec![1.0], vec![5], vec![0, 1], (1, 2));
        assert!(bad_column.is_err());

        let ok = CsrMatrix::new(vec![1.0], vec![1], vec![0, 1], (1, 2));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let csr = CsrMatrix::from_dense(&array![[0.0, 1.5], [2.5, 0.0]]);
        save_csr(&csr, file.path()).unwrap();

        let loaded = try_load_csr(file.path()).unwrap();
        assert_eq!(loaded, csr);
    }

    #[test]
    fn test_csv_is_not_sparse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a,b\n1,2").unwrap();
        assert_eq!(try_load_csr(file.path()), Err(SparseFallback::NotSparse));
    }

    #[test]
    fn test_truncated_payload_is_decode_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&CSR_MAGIC).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        assert!(matches!(try_load_csr(file.path()), Err(SparseFallback::Decode(_))));
    }

    #[test]
    fn test_missing_file_is_io_failure() {
        let result = try_load_csr("/nonexistent/gridfit/features.csr");
        assert!(matches!(result, Err(SparseFallback::Io(_))));
    }
}
