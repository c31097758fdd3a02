use super::{ApiError, ApiResult, AppState};
use crate::{
    core::sales::{self, CategorySummary, MonthlySales, SalesSummaryQuery, TopSellingProduct},
    errors::Error,
};
use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;

const DEFAULT_TOP_LIMIT: usize = 10;
const MAX_TOP_LIMIT: usize = 50;

/// Sales summary, category summary and top product routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sales_summary", get(sales_summary))
        .route("/category_summary", get(category_summary))
        .route("/top_products", get(top_products))
}

#[derive(Debug, Deserialize)]
struct TopProductsQuery {
    limit: Option<i64>,
}

async fn sales_summary(
    State(ctx): State<AppState>,
    query: Result<Query<SalesSummaryQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<MonthlySales>>> {
    let Query(query) = query?;
    Ok(Json(sales::sales_summary(&ctx.db, query).await?))
}

async fn category_summary(State(ctx): State<AppState>) -> ApiResult<Json<Vec<CategorySummary>>> {
    let summary = sales::category_summary(&ctx.db).await?;
    if summary.is_empty() {
        return Err(Error::NoSalesData {
            message: "No category sales data found".to_string(),
        }
        .into());
    }
    Ok(Json(summary))
}

async fn top_products(
    State(ctx): State<AppState>,
    query: Result<Query<TopProductsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<TopSellingProduct>>> {
    let Query(query) = query?;
    let limit = match query.limit {
        None => DEFAULT_TOP_LIMIT,
        Some(raw) => usize::try_from(raw)
            .ok()
            .filter(|limit| (1..=MAX_TOP_LIMIT).contains(limit))
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("limit must be between 1 and {MAX_TOP_LIMIT}, got {raw}"),
                )
            })?,
    };

    let products = sales::top_selling_products(&ctx.db, limit).await?;
    if products.is_empty() {
        return Err(Error::NoSalesData {
            message: "No product sales data found".to_string(),
        }
        .into());
    }
    Ok(Json(products))
}
