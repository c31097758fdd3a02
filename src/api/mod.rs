//! HTTP interface.
//!
//! Business routes are nested under `/api`; service info, health and the endpoint
//! catalogue live at the top level. Every error body is `{"detail": "<message>"}`.

/// Prediction, retraining and model introspection
pub mod forecast;
/// Product listing, lookup and creation
pub mod products;
/// Monthly, category and best-seller aggregates
pub mod sales;
/// Service info, health check and endpoint catalogue
pub mod system;

use crate::{core::forecast::ForecastService, errors::Error};
use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

/// Everything a request handler needs.
#[derive(Debug)]
pub struct AppContext {
    /// Database connection pool
    pub db: DatabaseConnection,
    /// Owner of the current forecast model
    pub forecaster: ForecastService,
}

/// Shared application state.
pub type AppState = Arc<AppContext>;

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(system::routes())
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(products::routes())
        .merge(sales::routes())
        .merge(forecast::routes())
}

/// Error response with a status code and a human readable detail.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status to answer with
    pub status: StatusCode,
    /// Message placed in the `detail` field
    pub detail: String,
}

impl ApiError {
    /// Creates an error response.
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::ProductNotFound { .. } | Error::NoSalesData { .. } => StatusCode::NOT_FOUND,
            Error::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::InvalidModelType { .. } | Error::InsufficientData { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::ModelNotTrained => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config { .. }
            | Error::Database(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Training { .. }
            | Error::Task(_) => {
                error!("Request failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
    }
}

/// Handler result type.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
