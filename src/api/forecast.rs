use super::{ApiError, ApiResult, AppState};
use crate::{
    core::forecast::{Prediction, PredictionRequest, RetrainRequest, SalesPredictionMetrics},
    errors::Error,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use tracing::info;

/// Prediction, retraining and model description routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/predict", post(predict))
        .route("/retrain", post(retrain))
        .route("/model_info", get(model_info))
}

async fn predict(
    State(ctx): State<AppState>,
    body: Result<Json<PredictionRequest>, JsonRejection>,
) -> ApiResult<Json<Prediction>> {
    let Json(request) = body?;
    Ok(Json(ctx.forecaster.predict(&ctx.db, request).await?))
}

/// The body is optional; an empty body retrains with the configured defaults.
async fn retrain(State(ctx): State<AppState>, body: Bytes) -> ApiResult<Json<SalesPredictionMetrics>> {
    let request: RetrainRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RetrainRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Invalid retrain request: {e}"),
            )
        })?
    };

    info!("Retraining requested: {:?}", request);
    Ok(Json(ctx.forecaster.train(&ctx.db, request).await?))
}

async fn model_info(State(ctx): State<AppState>) -> ApiResult<Json<SalesPredictionMetrics>> {
    match ctx.forecaster.model_info().await {
        Ok(info) => Ok(Json(info)),
        Err(Error::ModelNotTrained) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "Model not trained yet",
        )),
        Err(e) => Err(e.into()),
    }
}
