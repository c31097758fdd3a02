//! Regression quality metrics and feature importance.

use super::{
    Estimator, Matrix,
    preprocessing::{to_matrix, to_rows},
};
use crate::errors::{Error, Result};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use smartcore::metrics::{mean_absolute_error, mean_squared_error, r2};

/// Share of the mean absolute target used as the accuracy tolerance.
pub const ACCURACY_TOLERANCE: f64 = 0.2;

/// Hold-out evaluation of a fitted estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Coefficient of determination
    pub r2_score: f64,
    /// Root mean squared error
    pub rmse: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Share of predictions within `threshold` of the truth
    pub accuracy: f64,
    /// `0.2 * mean(|y_true|)`
    pub threshold: f64,
}

/// Coefficient of determination.
///
/// For constant targets it is 1.0 on a perfect fit and 0.0 otherwise.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let (y_true, y_pred) = (y_true.to_vec(), y_pred.to_vec());
    if y_true.windows(2).all(|w| w[0] == w[1]) {
        return if y_true == y_pred { 1.0 } else { 0.0 };
    }
    r2(&y_true, &y_pred)
}

/// Root mean squared error.
#[must_use]
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean_squared_error(&y_true.to_vec(), &y_pred.to_vec()).sqrt()
}

/// Mean absolute error.
#[must_use]
pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean_absolute_error(&y_true.to_vec(), &y_pred.to_vec())
}

/// Evaluates predictions against held-out targets.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(y_true: &[f64], y_pred: &[f64]) -> Result<Evaluation> {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return Err(Error::Training {
            message: format!(
                "cannot evaluate {} predictions against {} targets",
                y_pred.len(),
                y_true.len()
            ),
        });
    }

    let n = y_true.len() as f64;
    let threshold = ACCURACY_TOLERANCE * y_true.iter().map(|t| t.abs()).sum::<f64>() / n;
    let hits = y_true
        .iter()
        .zip(y_pred)
        .filter(|(t, p)| (*t - *p).abs() < threshold)
        .count();

    Ok(Evaluation {
        r2_score: r2_score(y_true, y_pred),
        rmse: rmse(y_true, y_pred),
        mae: mae(y_true, y_pred),
        accuracy: hits as f64 / n,
        threshold,
    })
}

/// Permutation importance of every column of `x`, normalised to sum to one.
///
/// Each column is shuffled in turn (seeded by `seed`) and the increase in mean
/// squared error over the unshuffled baseline is its raw importance. Columns
/// whose shuffle does not hurt the fit score zero.
///
/// # Errors
/// Returns [`Error::Training`] if the estimator cannot predict `x`.
pub fn permutation_importance(
    estimator: &Estimator,
    x: &Matrix,
    y: &[f64],
    seed: u64,
) -> Result<Vec<f64>> {
    let baseline = mean_squared_error(&y.to_vec(), &estimator.predict(x)?);
    let rows = to_rows(x);
    let n_features = rows.first().map_or(0, Vec::len);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut importances = Vec::with_capacity(n_features);
    for column in 0..n_features {
        let mut values: Vec<f64> = rows.iter().map(|row| row[column]).collect();
        values.shuffle(&mut rng);
        let permuted: Vec<Vec<f64>> = rows
            .iter()
            .zip(&values)
            .map(|(row, value)| {
                let mut row = row.clone();
                row[column] = *value;
                row
            })
            .collect();
        let error = mean_squared_error(&y.to_vec(), &estimator.predict(&to_matrix(&permuted)?)?);
        importances.push((error - baseline).max(0.0));
    }

    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        importances.iter_mut().for_each(|v| *v /= total);
    }
    Ok(importances)
}
