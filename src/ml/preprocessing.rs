//! Column statistics, value repair, feature scaling and the train/test split.

use super::{Matrix, model_error};
use crate::errors::{Error, Result};
use smartcore::{
    api::{Transformer, UnsupervisedEstimator},
    linalg::basic::{
        arrays::{Array, MutArray},
        matrix::DenseMatrix,
    },
    model_selection::train_test_split,
    preprocessing::numerical::{StandardScaler, StandardScalerParameters},
};

/// Values farther than this many standard deviations from the mean are outliers.
pub const OUTLIER_Z_SCORE: f64 = 3.0;

/// Arithmetic mean, `None` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median, averaging the two middle values for even lengths.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sample standard deviation (n - 1 denominator), `None` below two values.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Replaces values `<= 0` with the column median. Returns how many were replaced.
pub fn replace_non_positive_with_median(values: &mut [f64]) -> usize {
    let Some(median) = median(values) else {
        return 0;
    };
    let mut replaced = 0;
    for value in values.iter_mut().filter(|v| **v <= 0.0) {
        *value = median;
        replaced += 1;
    }
    replaced
}

/// Replaces values with `|x - mean| > 3 * std` by the column median.
///
/// Mean, standard deviation and median are all taken from the column before any
/// replacement. Nothing happens when the standard deviation is zero or undefined.
/// Returns how many values were replaced.
pub fn replace_outliers_with_median(values: &mut [f64]) -> usize {
    let (Some(mean), Some(std), Some(median)) = (mean(values), sample_std(values), median(values))
    else {
        return 0;
    };
    if std <= 0.0 {
        return 0;
    }
    let mut replaced = 0;
    for value in values.iter_mut() {
        if (*value - mean).abs() > OUTLIER_Z_SCORE * std {
            *value = median;
            replaced += 1;
        }
    }
    replaced
}

/// Column standardisation learnt on the training split.
pub type FeatureScaler = StandardScaler<f64>;

/// Builds a [`Matrix`] from rows, rejecting empty, ragged or non-finite input.
///
/// # Errors
/// Returns [`Error::Training`] describing the first problem found.
pub fn to_matrix(rows: &[Vec<f64>]) -> Result<Matrix> {
    let Some(first) = rows.first() else {
        return Err(Error::Training {
            message: "cannot build a matrix from zero rows".to_string(),
        });
    };
    let n_features = first.len();
    if let Some(row) = rows.iter().find(|row| row.len() != n_features) {
        return Err(Error::Training {
            message: format!("expected {n_features} features per row, got {}", row.len()),
        });
    }
    if rows.iter().flatten().any(|v| !v.is_finite()) {
        return Err(Error::Training {
            message: "feature rows contain non-finite values".to_string(),
        });
    }
    Ok(DenseMatrix::from_2d_vec(&rows.to_vec()))
}

/// Learns per-column means and standard deviations from `x`.
///
/// # Errors
/// Returns [`Error::Training`] if the scaler cannot be fitted.
pub fn fit_scaler(x: &Matrix) -> Result<FeatureScaler> {
    StandardScaler::fit(x, StandardScalerParameters::default()).map_err(model_error)
}

/// Applies `scaler` to `x`.
///
/// Columns that were constant during fitting have no spread to divide by; their
/// entries come out as zero.
///
/// # Errors
/// Returns [`Error::Training`] when `x` has a different column count.
pub fn scale(scaler: &FeatureScaler, x: &Matrix) -> Result<Matrix> {
    let mut scaled = scaler.transform(x).map_err(model_error)?;
    let (rows, cols) = scaled.shape();
    for i in 0..rows {
        for j in 0..cols {
            if !scaled.get((i, j)).is_finite() {
                scaled.set((i, j), 0.0);
            }
        }
    }
    Ok(scaled)
}

/// Copies a matrix back into rows.
#[must_use]
pub fn to_rows(x: &Matrix) -> Vec<Vec<f64>> {
    let (rows, cols) = x.shape();
    (0..rows)
        .map(|i| (0..cols).map(|j| *x.get((i, j))).collect())
        .collect()
}

/// Shuffled hold-out split of a dataset.
#[derive(Debug)]
pub struct TrainTestSplit {
    /// Samples to fit on
    pub x_train: Matrix,
    /// Held-out samples
    pub x_test: Matrix,
    /// Targets of `x_train`
    pub y_train: Vec<f64>,
    /// Targets of `x_test`
    pub y_test: Vec<f64>,
}

/// Shuffles the samples with `seed` and holds out `test_size` of them.
///
/// # Errors
/// Returns a validation error when `test_size` is outside `(0, 1)` or leaves
/// either side empty, and a training error for malformed rows.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn split_samples(
    rows: &[Vec<f64>],
    target: &[f64],
    test_size: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    if rows.len() != target.len() {
        return Err(Error::Training {
            message: format!("{} feature rows but {} targets", rows.len(), target.len()),
        });
    }
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(Error::Validation {
            message: format!("test_size must be between 0 and 1, got {test_size}"),
        });
    }
    let fraction = test_size as f32;
    let n_test = (rows.len() as f32 * fraction) as usize;
    if n_test == 0 || n_test >= rows.len() {
        return Err(Error::Validation {
            message: format!(
                "test_size {test_size} leaves no samples on one side of a {}-sample split",
                rows.len()
            ),
        });
    }

    let x = to_matrix(rows)?;
    let (x_train, x_test, y_train, y_test) =
        train_test_split(&x, &target.to_vec(), fraction, true, Some(seed));
    Ok(TrainTestSplit {
        x_train,
        x_test,
        y_train,
        y_test,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_sample_std() {
        let std = sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((std - 2.138_089_935_299_395).abs() < 1e-12);
        assert_eq!(sample_std(&[1.0]), None);
    }

    #[test]
    fn test_replace_non_positive_with_median() {
        let mut values = vec![0.0, 4.0, -2.0, 6.0, 8.0];
        let replaced = replace_non_positive_with_median(&mut values);
        assert_eq!(replaced, 2);
        assert_eq!(values, vec![4.0, 4.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_replace_outliers_with_median() {
        let mut values: Vec<f64> = (0..20).map(|i| 10.0 + f64::from(i % 3)).collect();
        values.push(500.0);
        let original_mean = mean(&values).unwrap();
        let original_std = sample_std(&values).unwrap();

        let replaced = replace_outliers_with_median(&mut values);

        assert_eq!(replaced, 1);
        assert_eq!(values[20], 11.0);
        assert!(
            values
                .iter()
                .all(|v| (v - original_mean).abs() <= OUTLIER_Z_SCORE * original_std)
        );
    }

    #[test]
    fn test_replace_outliers_constant_column_untouched() {
        let mut values = vec![5.0; 10];
        assert_eq!(replace_outliers_with_median(&mut values), 0);
        assert_eq!(values, vec![5.0; 10]);
    }

    #[test]
    fn test_to_matrix_rejects_bad_rows() {
        assert!(to_matrix(&[]).is_err());
        assert!(to_matrix(&[vec![1.0, 2.0], vec![3.0]]).is_err());
        assert!(to_matrix(&[vec![f64::NAN]]).is_err());

        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(to_rows(&to_matrix(&rows).unwrap()), rows);
    }

    #[test]
    fn test_scale_standardises_and_zeroes_constant_columns() {
        let x = to_matrix(&[vec![1.0, 7.0], vec![3.0, 7.0], vec![5.0, 7.0]]).unwrap();
        let scaler = fit_scaler(&x).unwrap();
        let scaled = to_rows(&scale(&scaler, &x).unwrap());

        let column: Vec<f64> = scaled.iter().map(|row| row[0]).collect();
        assert!(mean(&column).unwrap().abs() < 1e-12);
        assert!(column[0] < 0.0 && column[2] > 0.0);
        assert!(scaled.iter().all(|row| row[1] == 0.0));

        // unseen values in a constant column stay finite too
        let fresh = to_rows(&scale(&scaler, &to_matrix(&[vec![2.0, 9.0]]).unwrap()).unwrap());
        assert_eq!(fresh[0][1], 0.0);

        assert!(scale(&scaler, &to_matrix(&[vec![1.0]]).unwrap()).is_err());
    }

    #[test]
    fn test_split_samples_sizes_and_determinism() {
        let rows: Vec<Vec<f64>> = (0..60).map(|i| vec![f64::from(i)]).collect();
        let target: Vec<f64> = (0..60).map(f64::from).collect();

        let split = split_samples(&rows, &target, 0.2, 42).unwrap();
        assert_eq!(split.y_test.len(), 12);
        assert_eq!(split.y_train.len(), 48);

        let mut all: Vec<f64> = split.y_train.iter().chain(&split.y_test).copied().collect();
        all.sort_by(f64::total_cmp);
        assert_eq!(all, target);

        // rows travel with their targets
        for (row, y) in to_rows(&split.x_test).iter().zip(&split.y_test) {
            assert_eq!(row[0], *y);
        }

        let again = split_samples(&rows, &target, 0.2, 42).unwrap();
        assert_eq!(again.y_test, split.y_test);
    }

    #[test]
    fn test_split_samples_rejects_bad_input() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        let target = vec![1.0; 10];
        assert!(split_samples(&rows, &target, 0.0, 0).is_err());
        assert!(split_samples(&rows, &target, 1.5, 0).is_err());
        assert!(matches!(
            split_samples(&rows, &target, 0.05, 0),
            Err(Error::Validation { .. })
        ));
        assert!(split_samples(&rows, &target[..9], 0.2, 0).is_err());
    }
}
