//! Model families, training parameters and the fitted estimators.
//!
//! The estimators themselves come from `smartcore` and operate on its
//! [`DenseMatrix`]. [`Estimator`] is the closed set of supported models and is
//! what gets persisted inside a trained model artefact.

/// R², RMSE, MAE, threshold accuracy and permutation importance
pub mod metrics;
/// Summary statistics, outlier repair, scaling and splitting
pub mod preprocessing;

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use smartcore::{
    algorithm::neighbour::KNNAlgorithmName,
    error::Failed,
    linalg::basic::matrix::DenseMatrix,
    linear::{
        linear_regression::{LinearRegression, LinearRegressionParameters, LinearRegressionSolverName},
        logistic_regression::{LogisticRegression, LogisticRegressionParameters},
    },
    metrics::distance::euclidian::Euclidian,
    neighbors::knn_regressor::{KNNRegressor, KNNRegressorParameters},
    tree::decision_tree_regressor::{DecisionTreeRegressor, DecisionTreeRegressorParameters},
};
use std::{fmt, str::FromStr};

/// Dense feature matrix, one row per sample.
pub type Matrix = DenseMatrix<f64>;

type TreeModel = DecisionTreeRegressor<f64, f64, Matrix, Vec<f64>>;
type LinearModel = LinearRegression<f64, f64, Matrix, Vec<f64>>;
type KnnModel = KNNRegressor<f64, f64, Matrix, Vec<f64>, Euclidian<f64>>;
type LogisticModel = LogisticRegression<f64, i32, Matrix, Vec<i32>>;

/// L2 penalty of the logistic model, matching an inverse regularisation of 1.
const LOGISTIC_ALPHA: f64 = 1.0;

/// Supported model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// CART regression tree
    #[default]
    DecisionTree,
    /// Ordinary least squares
    Linear,
    /// K-nearest-neighbours regression
    Knn,
    /// Multinomial logistic regression over observed quantities
    Logistic,
}

impl ModelType {
    /// Every supported model type, in display order.
    pub const ALL: [Self; 4] = [Self::DecisionTree, Self::Linear, Self::Knn, Self::Logistic];

    /// Wire name of the model type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DecisionTree => "decision_tree",
            Self::Linear => "linear",
            Self::Knn => "knn",
            Self::Logistic => "logistic",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|model_type| model_type.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidModelType {
                name: s.to_string(),
            })
    }
}

/// Hyperparameters and split settings for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Which estimator to fit
    pub model_type: ModelType,
    /// Fraction of samples held out for evaluation, in `(0, 1)`
    pub test_size: f64,
    /// Seed for the train/test shuffle
    pub random_state: u64,
    /// Neighbour count for `knn`
    pub n_neighbors: usize,
    /// Depth limit for `decision_tree`; unlimited when `None`
    pub max_depth: Option<usize>,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            model_type: ModelType::DecisionTree,
            test_size: 0.2,
            random_state: 42,
            n_neighbors: 5,
            max_depth: None,
        }
    }
}

impl TrainingParams {
    /// Checks that the parameters describe a runnable training job.
    pub fn validate(&self) -> Result<()> {
        if !self.test_size.is_finite() || self.test_size <= 0.0 || self.test_size >= 1.0 {
            return Err(Error::Validation {
                message: format!("test_size must be between 0 and 1, got {}", self.test_size),
            });
        }
        if self.n_neighbors == 0 {
            return Err(Error::Validation {
                message: "n_neighbors must be at least 1".to_string(),
            });
        }
        if self.max_depth == Some(0) {
            return Err(Error::Validation {
                message: "max_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// A fitted estimator of any supported family.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    /// CART regression tree
    DecisionTree(TreeModel),
    /// Least squares solved through SVD
    Linear(LinearModel),
    /// Uniformly weighted k-nearest-neighbours, brute-force search
    Knn(KnnModel),
    /// Multinomial logistic regression over the rounded targets
    Logistic(LogisticModel),
}

impl fmt::Debug for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Estimator").field(&self.model_type()).finish()
    }
}

impl Estimator {
    /// Fits the estimator selected by `params` on `x` and targets `y`.
    ///
    /// # Errors
    /// Returns [`Error::Training`] when the underlying model fails to fit,
    /// including a logistic fit on fewer than two distinct targets.
    #[allow(clippy::cast_possible_truncation)]
    pub fn fit(params: &TrainingParams, x: &Matrix, y: &[f64]) -> Result<Self> {
        if y.is_empty() {
            return Err(Error::Training {
                message: "cannot fit on an empty dataset".to_string(),
            });
        }
        let targets = y.to_vec();
        let estimator = match params.model_type {
            ModelType::DecisionTree => {
                let mut parameters = DecisionTreeRegressorParameters::default();
                if let Some(depth) = params.max_depth {
                    parameters = parameters.with_max_depth(u16::try_from(depth).unwrap_or(u16::MAX));
                }
                Self::DecisionTree(TreeModel::fit(x, &targets, parameters).map_err(model_error)?)
            }
            ModelType::Linear => {
                let parameters =
                    LinearRegressionParameters::default().with_solver(LinearRegressionSolverName::SVD);
                Self::Linear(LinearModel::fit(x, &targets, parameters).map_err(model_error)?)
            }
            ModelType::Knn => {
                // never ask for more neighbours than there are samples
                let parameters = KNNRegressorParameters::default()
                    .with_k(params.n_neighbors.min(y.len()))
                    .with_algorithm(KNNAlgorithmName::LinearSearch);
                Self::Knn(KnnModel::fit(x, &targets, parameters).map_err(model_error)?)
            }
            ModelType::Logistic => {
                let labels: Vec<i32> = y.iter().map(|v| v.round() as i32).collect();
                if labels.iter().all(|label| *label == labels[0]) {
                    return Err(Error::Training {
                        message: "logistic model needs at least two distinct targets".to_string(),
                    });
                }
                let parameters = LogisticRegressionParameters::default().with_alpha(LOGISTIC_ALPHA);
                Self::Logistic(LogisticModel::fit(x, &labels, parameters).map_err(model_error)?)
            }
        };
        Ok(estimator)
    }

    /// Predicts one value per row of `x`.
    ///
    /// # Errors
    /// Returns [`Error::Training`] when `x` does not match the fitted shape.
    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        match self {
            Self::DecisionTree(model) => model.predict(x).map_err(model_error),
            Self::Linear(model) => model.predict(x).map_err(model_error),
            Self::Knn(model) => model.predict(x).map_err(model_error),
            Self::Logistic(model) => Ok(model
                .predict(x)
                .map_err(model_error)?
                .into_iter()
                .map(f64::from)
                .collect()),
        }
    }

    /// The family of this estimator.
    #[must_use]
    pub const fn model_type(&self) -> ModelType {
        match self {
            Self::DecisionTree(_) => ModelType::DecisionTree,
            Self::Linear(_) => ModelType::Linear,
            Self::Knn(_) => ModelType::Knn,
            Self::Logistic(_) => ModelType::Logistic,
        }
    }
}

/// Converts a `smartcore` failure into a training error.
pub(crate) fn model_error(failure: Failed) -> Error {
    Error::Training {
        message: failure.to_string(),
    }
}
