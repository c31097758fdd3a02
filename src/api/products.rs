use super::{ApiResult, AppState};
use crate::{
    core::product::{self, NewProduct, ProductFilter},
    entities::ProductModel,
};
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    routing::get,
};

/// Product listing, lookup and creation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:product_id", get(get_product))
}

async fn list_products(
    State(ctx): State<AppState>,
    query: Result<Query<ProductFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<ProductModel>>> {
    let Query(filter) = query?;
    Ok(Json(product::list_products(&ctx.db, &filter).await?))
}

async fn get_product(
    State(ctx): State<AppState>,
    Path(product_id): Path<i32>,
) -> ApiResult<Json<ProductModel>> {
    Ok(Json(product::require_product(&ctx.db, product_id).await?))
}

async fn create_product(
    State(ctx): State<AppState>,
    body: Result<Json<NewProduct>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ProductModel>)> {
    let Json(new) = body?;
    let created = product::create_product(&ctx.db, new).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
