//! Forecast model lifecycle - Training, persistence, lazy loading and prediction.
//!
//! The current model is shared behind a `RwLock<Option<Arc<ModelArtifact>>>`.
//! Predictions clone the `Arc` under a read lock. Retraining is serialised by a
//! separate mutex and runs as its own task, so a caller that goes away cannot
//! leave a saved model that differs from the one in memory.

use crate::{
    core::features::{FeatureMatrix, align, prepare_prediction_features, prepare_training_data},
    errors::{Error, Result},
    ml::{
        Estimator, ModelType, TrainingParams,
        metrics::{evaluate, permutation_importance},
        preprocessing::{FeatureScaler, fit_scaler, scale, split_samples, to_matrix},
    },
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Deserializer, Serialize, de};
use std::{
    collections::BTreeMap,
    fmt, fs,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{Instrument, debug, info, instrument, warn};

/// Fewest prepared samples a training run accepts.
pub const MIN_TRAINING_SAMPLES: usize = 10;
/// Confidence reported when the model carries no usable R².
pub const DEFAULT_CONFIDENCE: f64 = 0.8;
const MIN_CONFIDENCE: f64 = 0.5;
const MAX_CONFIDENCE: f64 = 0.95;

/// Body of a prediction request.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionRequest {
    /// Product to forecast
    pub product_id: i32,
    /// Month to forecast; accepts RFC 3339, naive date-times and plain dates
    #[serde(deserialize_with = "deserialize_order_date")]
    pub order_date: NaiveDateTime,
    /// Ordering customer; unknown ids are ignored
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Expected order size, used to estimate the month's revenue
    #[serde(default)]
    pub quantity: Option<f64>,
    /// Per-feature overrides applied after the computed values
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
}

/// Parses the date formats accepted for `order_date`.
#[must_use]
pub fn parse_order_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn deserialize_order_date<'de, D>(deserializer: D) -> std::result::Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_order_date(&raw)
        .ok_or_else(|| de::Error::custom(format!("invalid order_date '{raw}'")))
}

/// Optional overrides for a training run; unset fields use the configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrainRequest {
    /// `decision_tree`, `linear`, `knn` or `logistic`
    pub model_type: Option<String>,
    /// Hold-out fraction in `(0, 1)`
    pub test_size: Option<f64>,
    /// Shuffle seed
    pub random_state: Option<u64>,
    /// Neighbour count for `knn`
    pub n_neighbors: Option<usize>,
    /// Depth limit for `decision_tree`
    pub max_depth: Option<usize>,
}

impl RetrainRequest {
    /// Resolves the request against `defaults` and validates the result.
    ///
    /// # Errors
    /// Returns [`Error::InvalidModelType`] for an unknown model name and a
    /// validation error for out-of-range parameters.
    pub fn into_params(self, defaults: &TrainingParams) -> Result<TrainingParams> {
        let model_type = match self.model_type.as_deref() {
            Some(name) => name.parse::<ModelType>()?,
            None => defaults.model_type,
        };
        let params = TrainingParams {
            model_type,
            test_size: self.test_size.unwrap_or(defaults.test_size),
            random_state: self.random_state.unwrap_or(defaults.random_state),
            n_neighbors: self.n_neighbors.unwrap_or(defaults.n_neighbors),
            max_depth: self.max_depth.or(defaults.max_depth),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Hold-out scores of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Coefficient of determination on the test split
    pub r2_score: f64,
    /// Root mean squared error on the test split
    pub rmse: f64,
    /// Mean absolute error on the test split
    pub mae: f64,
    /// Share of test predictions within `threshold` of the truth
    pub accuracy: f64,
    /// Tolerance used for `accuracy`, in units
    pub threshold: f64,
    /// Samples the estimator was fitted on
    pub train_samples: usize,
    /// Samples held out for scoring
    pub test_samples: usize,
}

/// Importance of one input column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    /// Share of the total importance, in `[0, 1]`
    pub importance: f64,
}

/// Everything needed to reproduce predictions of a trained model.
#[derive(Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Family of `estimator`
    pub model_type: ModelType,
    /// Parameters the model was trained with
    pub params: TrainingParams,
    /// The fitted model
    pub estimator: Estimator,
    /// Standardisation learnt on the training split
    pub scaler: FeatureScaler,
    /// Input columns in training order
    pub features: Vec<String>,
    /// Permutation importance per entry of `features`, decision trees only
    #[serde(default)]
    pub importances: Option<Vec<f64>>,
    /// Hold-out scores
    pub metrics: TrainingMetrics,
    /// When training finished
    pub trained_date: DateTime<Utc>,
}

impl fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("model_type", &self.model_type)
            .field("params", &self.params)
            .field("features", &self.features)
            .field("metrics", &self.metrics)
            .field("trained_date", &self.trained_date)
            .finish_non_exhaustive()
    }
}

/// Description of the current model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub metrics: TrainingMetrics,
    /// Input columns in training order
    pub features: Vec<String>,
    pub trained_date: DateTime<Utc>,
    pub model_type: ModelType,
    pub params: TrainingParams,
    /// Decision trees only, most important first
    pub feature_importance: Option<Vec<FeatureImportance>>,
}

/// Response of the retrain and model info endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesPredictionMetrics {
    /// Copied from [`TrainingMetrics::r2_score`]
    pub r2_score: f64,
    pub rmse: f64,
    pub mae: f64,
    pub accuracy: f64,
    pub threshold: f64,
    /// Full description of the model
    pub model_info: ModelInfo,
}

/// One forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Forecast product
    pub product_id: i32,
    /// Name of the forecast product
    pub product_name: String,
    /// Whole, non-negative number of units
    pub predicted_quantity: f64,
    /// In `[0.5, 0.95]`
    pub confidence: f64,
    /// When the prediction was made
    pub timestamp: DateTime<Utc>,
}

/// Most feature importances listed in a training report.
pub const REPORTED_IMPORTANCES: usize = 10;

impl SalesPredictionMetrics {
    /// Human-readable summary of a training run, one line per entry.
    #[must_use]
    pub fn report(&self) -> Vec<String> {
        let model = &self.model_info;
        let mut lines = vec![
            format!("Model: {}, trained at {}", model.model_type, model.trained_date),
            format!(
                "Samples: {} train / {} test",
                model.metrics.train_samples, model.metrics.test_samples
            ),
            format!(
                "R2 {:.4}, RMSE {:.4}, MAE {:.4}",
                self.r2_score, self.rmse, self.mae
            ),
            format!(
                "Accuracy {:.2}% (within {:.2} units)",
                self.accuracy * 100.0,
                self.threshold
            ),
        ];
        if let Some(importance) = &model.feature_importance {
            lines.push(format!(
                "Top {} feature importances:",
                importance.len().min(REPORTED_IMPORTANCES)
            ));
            lines.extend(
                importance
                    .iter()
                    .take(REPORTED_IMPORTANCES)
                    .map(|f| format!("  {:<20} {:.4}", f.feature, f.importance)),
            );
        }
        lines
    }
}

/// Maps an R² score to a prediction confidence.
#[must_use]
pub fn confidence_from_r2(r2: Option<f64>) -> f64 {
    match r2 {
        Some(r2) if r2.is_finite() => r2.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE),
        _ => DEFAULT_CONFIDENCE,
    }
}

/// Splits, scales, fits and evaluates a model on `matrix`.
///
/// # Errors
/// Returns [`Error::InsufficientData`] below [`MIN_TRAINING_SAMPLES`], validation
/// errors for bad parameters and training errors from the estimator.
pub fn fit_artifact(
    matrix: FeatureMatrix,
    params: TrainingParams,
    trained_date: DateTime<Utc>,
) -> Result<ModelArtifact> {
    params.validate()?;
    if matrix.len() < MIN_TRAINING_SAMPLES {
        return Err(Error::InsufficientData {
            samples: matrix.len(),
            required: MIN_TRAINING_SAMPLES,
        });
    }

    let split = split_samples(&matrix.rows, &matrix.target, params.test_size, params.random_state)?;
    let scaler = fit_scaler(&split.x_train)?;
    let x_train = scale(&scaler, &split.x_train)?;
    let estimator = Estimator::fit(&params, &x_train, &split.y_train)?;

    let predictions = estimator.predict(&scale(&scaler, &split.x_test)?)?;
    let evaluation = evaluate(&split.y_test, &predictions)?;
    debug!(?evaluation, "Evaluated {} on {} held-out samples", params.model_type, split.y_test.len());

    let importances = match params.model_type {
        ModelType::DecisionTree => Some(permutation_importance(
            &estimator,
            &x_train,
            &split.y_train,
            params.random_state,
        )?),
        ModelType::Linear | ModelType::Knn | ModelType::Logistic => None,
    };

    Ok(ModelArtifact {
        model_type: params.model_type,
        params,
        estimator,
        scaler,
        features: matrix.feature_names,
        importances,
        metrics: TrainingMetrics {
            r2_score: evaluation.r2_score,
            rmse: evaluation.rmse,
            mae: evaluation.mae,
            accuracy: evaluation.accuracy,
            threshold: evaluation.threshold,
            train_samples: split.y_train.len(),
            test_samples: split.y_test.len(),
        },
        trained_date,
    })
}

impl ModelArtifact {
    /// Writes the artefact as JSON, creating parent directories.
    ///
    /// The file is written next to `path` first and renamed into place; the
    /// staging file is removed again if any step fails.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = path.with_extension("json.tmp");
        let written = self
            .write_json(&staging)
            .and_then(|()| fs::rename(&staging, path).map_err(Error::from));
        if written.is_err() && staging.exists() {
            if let Err(e) = fs::remove_file(&staging) {
                warn!("Failed to remove staging file {:?}: {}", staging, e);
            }
        }
        written
    }

    fn write_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads an artefact written by [`ModelArtifact::save`].
    ///
    /// # Errors
    /// Returns an error if the file is missing or not a valid artefact.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(fs::File::open(path)?);
        let artifact: Self = serde_json::from_reader(reader)?;
        if artifact.estimator.model_type() != artifact.model_type {
            return Err(Error::Training {
                message: format!(
                    "model file is labelled {} but holds a {} estimator",
                    artifact.model_type,
                    artifact.estimator.model_type()
                ),
            });
        }
        if artifact
            .importances
            .as_ref()
            .is_some_and(|importances| importances.len() != artifact.features.len())
        {
            return Err(Error::Training {
                message: "model file importances do not match its features".to_string(),
            });
        }
        Ok(artifact)
    }

    /// Scales `rows` (in training column order) and predicts them.
    ///
    /// # Errors
    /// Returns an error if the rows do not match the trained feature count.
    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        self.estimator.predict(&scale(&self.scaler, &to_matrix(rows)?)?)
    }

    /// Feature importances sorted descending, decision trees only.
    #[must_use]
    pub fn feature_importance(&self) -> Option<Vec<FeatureImportance>> {
        if self.model_type != ModelType::DecisionTree {
            return None;
        }
        let mut ranked: Vec<FeatureImportance> = self
            .features
            .iter()
            .zip(self.importances.as_ref()?)
            .map(|(feature, importance)| FeatureImportance {
                feature: feature.clone(),
                importance: *importance,
            })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        Some(ranked)
    }

    #[must_use]
    pub fn confidence(&self) -> f64 {
        confidence_from_r2(Some(self.metrics.r2_score))
    }

    #[must_use]
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            metrics: self.metrics,
            features: self.features.clone(),
            trained_date: self.trained_date,
            model_type: self.model_type,
            params: self.params.clone(),
            feature_importance: self.feature_importance(),
        }
    }

    /// Flattened metrics plus model description.
    #[must_use]
    pub fn summary(&self) -> SalesPredictionMetrics {
        SalesPredictionMetrics {
            r2_score: self.metrics.r2_score,
            rmse: self.metrics.rmse,
            mae: self.metrics.mae,
            accuracy: self.metrics.accuracy,
            threshold: self.metrics.threshold,
            model_info: self.info(),
        }
    }
}

/// Owns the current model and coordinates training and prediction.
#[derive(Debug)]
pub struct ForecastService {
    model_path: PathBuf,
    defaults: TrainingParams,
    current: Arc<RwLock<Option<Arc<ModelArtifact>>>>,
    training: Arc<Mutex<()>>,
}

impl ForecastService {
    /// Creates a service persisting to `model_path`. Nothing is loaded until needed.
    #[must_use]
    pub fn new(model_path: PathBuf, defaults: TrainingParams) -> Self {
        Self {
            model_path,
            defaults,
            current: Arc::new(RwLock::new(None)),
            training: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Whether a model is loaded in memory (no disk access).
    pub async fn is_loaded(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// The current model, loading it from disk on first use.
    ///
    /// A missing or unreadable model file counts as untrained.
    ///
    /// # Errors
    /// Returns [`Error::ModelNotTrained`] when no model is available.
    pub async fn current_model(&self) -> Result<Arc<ModelArtifact>> {
        if let Some(model) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(model));
        }

        let mut slot = self.current.write().await;
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        let path = self.model_path.clone();
        if !path.exists() {
            debug!("No model file at {:?}", path);
            return Err(Error::ModelNotTrained);
        }
        match tokio::task::spawn_blocking(move || ModelArtifact::load(&path)).await? {
            Ok(artifact) => {
                info!(
                    "Loaded {} model trained at {} from {:?}",
                    artifact.model_type, artifact.trained_date, self.model_path
                );
                let artifact = Arc::new(artifact);
                *slot = Some(Arc::clone(&artifact));
                Ok(artifact)
            }
            Err(e) => {
                warn!("Ignoring unreadable model file {:?}: {}", self.model_path, e);
                Err(Error::ModelNotTrained)
            }
        }
    }

    /// Trains a new model on all sales data, persists it and makes it current.
    ///
    /// Concurrent calls run one after another. Once started, a run finishes even
    /// if the returned future is dropped, so the saved and the current model
    /// always agree.
    ///
    /// # Errors
    /// Returns an error for invalid parameters, too little data, fitting failures
    /// and persistence failures. The previous model stays current on error.
    #[instrument(skip(self, db))]
    pub async fn train(
        &self,
        db: &DatabaseConnection,
        request: RetrainRequest,
    ) -> Result<SalesPredictionMetrics> {
        let params = request.into_params(&self.defaults)?;
        let guard = Arc::clone(&self.training).lock_owned().await;

        let db = db.clone();
        let path = self.model_path.clone();
        let current = Arc::clone(&self.current);
        let run = async move {
            let _guard = guard;
            let matrix = prepare_training_data(&db)
                .await?
                .ok_or(Error::InsufficientData {
                    samples: 0,
                    required: MIN_TRAINING_SAMPLES,
                })?;

            let artifact = tokio::task::spawn_blocking(move || {
                let artifact = fit_artifact(matrix, params, Utc::now())?;
                artifact.save(&path)?;
                Ok::<_, Error>(artifact)
            })
            .await??;

            info!(
                "Trained {} model: r2 {:.4}, rmse {:.4}, mae {:.4}, accuracy {:.4} ({} train / {} test)",
                artifact.model_type,
                artifact.metrics.r2_score,
                artifact.metrics.rmse,
                artifact.metrics.mae,
                artifact.metrics.accuracy,
                artifact.metrics.train_samples,
                artifact.metrics.test_samples
            );

            let summary = artifact.summary();
            *current.write().await = Some(Arc::new(artifact));
            Ok::<_, Error>(summary)
        };
        tokio::spawn(run.in_current_span()).await?
    }

    /// Predicts the monthly quantity for the requested product and date.
    ///
    /// # Errors
    /// Returns [`Error::ModelNotTrained`] before any training, not-found errors for
    /// unknown products or customers, and validation errors for bad input.
    #[instrument(skip(self, db))]
    pub async fn predict(
        &self,
        db: &DatabaseConnection,
        request: PredictionRequest,
    ) -> Result<Prediction> {
        let model = self.current_model().await?;
        let (product, named) = prepare_prediction_features(db, &request).await?;

        let row = align(&named, &model.features);
        let raw = model
            .predict_rows(&[row])?
            .first()
            .copied()
            .ok_or_else(|| Error::Training {
                message: "model returned no prediction".to_string(),
            })?;
        let predicted_quantity = if raw.is_finite() { raw.max(0.0).round() } else { 0.0 };

        debug!(
            "Predicted {} units of product {} (raw {:.3})",
            predicted_quantity, product.product_id, raw
        );
        Ok(Prediction {
            product_id: product.product_id,
            product_name: product.product_name,
            predicted_quantity,
            confidence: model.confidence(),
            timestamp: Utc::now(),
        })
    }

    /// Metrics and description of the current model.
    ///
    /// # Errors
    /// Returns [`Error::ModelNotTrained`] when no model is available.
    pub async fn model_info(&self) -> Result<SalesPredictionMetrics> {
        Ok(self.current_model().await?.summary())
    }
}
