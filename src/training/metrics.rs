//! Scoring functions

use crate::error::{GridfitError, Result};
use ndarray::Array1;

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(GridfitError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        return Err(GridfitError::ValidationError(
            "cannot score an empty sample".to_string(),
        ));
    }
    Ok(())
}

/// Fraction of exactly matching class predictions
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// Coefficient of determination.
///
/// A constant target scores 1.0 when predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        let y = array![0.0, 1.0, 2.0, 1.0];
        let p = array![0.0, 1.0, 1.0, 1.0];
        assert!((accuracy(&y, &p).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_r2_perfect_and_mean() {
        let y = array![1.0, 2.0, 3.0];
        assert!((r2_score(&y, &y).unwrap() - 1.0).abs() < 1e-12);
        let mean = array![2.0, 2.0, 2.0];
        assert!(r2_score(&y, &mean).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_r2_constant_target() {
        let y = array![4.0, 4.0];
        assert_eq!(r2_score(&y, &array![4.0, 4.0]).unwrap(), 1.0);
        assert_eq!(r2_score(&y, &array![3.0, 4.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(accuracy(&array![1.0], &array![1.0, 0.0]).is_err());
        let empty = Array1::<f64>::zeros(0);
        assert!(r2_score(&empty, &empty).is_err());
    }
}
