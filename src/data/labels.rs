//! Label values and target encoding

use crate::config::ProblemType;
use crate::error::{GridfitError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single label as read from disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LabelValue {
    Numeric(f64),
    Raw(String),
}

impl LabelValue {
    /// Coerce a cell, keeping the raw text when it is not a number
    pub fn parse(cell: &str) -> Self {
        match cell.trim().parse::<f64>() {
            Ok(v) => LabelValue::Numeric(v),
            Err(_) => LabelValue::Raw(cell.to_string()),
        }
    }

    fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (LabelValue::Numeric(a), LabelValue::Numeric(b)) => a.total_cmp(b),
            (LabelValue::Numeric(_), LabelValue::Raw(_)) => Ordering::Less,
            (LabelValue::Raw(_), LabelValue::Numeric(_)) => Ordering::Greater,
            (LabelValue::Raw(a), LabelValue::Raw(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Numeric(v) => write!(f, "{}", v),
            LabelValue::Raw(s) => f.write_str(s),
        }
    }
}

/// Label vector, one value per sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Labels {
    values: Vec<LabelValue>,
}

impl Labels {
    pub fn new(values: Vec<LabelValue>) -> Self {
        Self { values }
    }

    pub fn from_numeric(values: &[f64]) -> Self {
        Self::new(values.iter().map(|&v| LabelValue::Numeric(v)).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[LabelValue] {
        &self.values
    }

    pub fn select(&self, rows: &[usize]) -> Self {
        Self::new(rows.iter().map(|&i| self.values[i].clone()).collect())
    }

    /// Number of labels that could not be read as numbers
    pub fn n_raw(&self) -> usize {
        self.values
            .iter()
            .filter(|v| matches!(v, LabelValue::Raw(_)))
            .count()
    }
}

/// Numeric targets ready for the estimators
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTargets {
    pub y: Array1<f64>,
    /// Original class labels by index (classification only)
    pub classes: Vec<LabelValue>,
}

/// Turn labels into the numeric target the estimators train on.
///
/// Classification labels become class indices `0..k` in sorted label
/// order; regression labels must all be numeric.
pub fn encode_targets(labels: &Labels, problem: ProblemType) -> Result<EncodedTargets> {
    match problem {
        ProblemType::Regression => {
            let y = labels
                .values()
                .iter()
                .enumerate()
                .map(|(row, v)| match v {
                    LabelValue::Numeric(x) => Ok(*x),
                    LabelValue::Raw(s) => Err(GridfitError::DataError(format!(
                        "regression label on row {} is not numeric: {:?}",
                        row + 1,
                        s
                    ))),
                })
                .collect::<Result<Vec<f64>>>()?;
            Ok(EncodedTargets {
                y: Array1::from_vec(y),
                classes: Vec::new(),
            })
        }
        ProblemType::Category => {
            let mut classes: Vec<LabelValue> = labels.values().to_vec();
            classes.sort_by(|a, b| a.sort_cmp(b));
            classes.dedup_by(|a, b| a.sort_cmp(b) == Ordering::Equal);

            let y = labels
                .values()
                .iter()
                .map(|v| {
                    classes
                        .binary_search_by(|c| c.sort_cmp(v))
                        .map(|idx| idx as f64)
                        .map_err(|_| GridfitError::DataError(format!("unknown class {}", v)))
                })
                .collect::<Result<Vec<f64>>>()?;

            Ok(EncodedTargets {
                y: Array1::from_vec(y),
                classes,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_raw_text() {
        assert_eq!(LabelValue::parse(" 1e-3 "), LabelValue::Numeric(0.001));
        assert_eq!(LabelValue::parse("cat"), LabelValue::Raw("cat".to_string()));
    }

    #[test]
    fn test_encode_string_classes() {
        let labels = Labels::new(vec![
            LabelValue::parse("dog"),
            LabelValue::parse("cat"),
            LabelValue::parse("dog"),
            LabelValue::parse("bird"),
        ]);
        let encoded = encode_targets(&labels, ProblemType::Category).unwrap();

        assert_eq!(encoded.y.to_vec(), vec![2.0, 1.0, 2.0, 0.0]);
        assert_eq!(encoded.classes.len(), 3);
        assert_eq!(encoded.classes[0], LabelValue::Raw("bird".to_string()));
    }

    #[test]
    fn test_encode_numeric_classes_in_numeric_order() {
        let labels = Labels::from_numeric(&[10.0, 2.0, 10.0]);
        let encoded = encode_targets(&labels, ProblemType::Category).unwrap();
        assert_eq!(encoded.y.to_vec(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_regression_rejects_raw_labels() {
        let labels = Labels::new(vec![LabelValue::Numeric(1.0), LabelValue::parse("high")]);
        let err = encode_targets(&labels, ProblemType::Regression);
        assert!(matches!(err, Err(GridfitError::DataError(_))));
    }
}
