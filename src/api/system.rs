use super::AppState;
use crate::config::database;
use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

/// Endpoints listed by `GET /docs`: method, path and summary.
const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/", "Service information"),
    ("GET", "/health", "Database connectivity check"),
    ("GET", "/docs", "This endpoint catalogue"),
    ("GET", "/api/products", "List products (skip, limit, category_id, discontinued)"),
    ("GET", "/api/products/:product_id", "Get one product"),
    ("POST", "/api/products", "Create a product"),
    ("GET", "/api/sales_summary", "Monthly sales per product (year, month, product_id, category_id)"),
    ("GET", "/api/category_summary", "Sales totals per category"),
    ("GET", "/api/top_products", "Best selling products by quantity (limit 1-50)"),
    ("POST", "/api/predict", "Forecast the monthly quantity of a product"),
    ("POST", "/api/retrain", "Retrain the forecast model"),
    ("GET", "/api/model_info", "Metrics and features of the current model"),
];

/// Service banner, health check and endpoint listing.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/docs", get(docs))
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Welcome to Sales Forecast API",
        "docs": "/docs",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    database: &'static str,
    model_loaded: bool,
}

async fn health(State(ctx): State<AppState>) -> Json<Health> {
    let database_ok = match database::ping(&ctx.db).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check database ping failed: {}", e);
            false
        }
    };
    Json(Health {
        status: if database_ok { "healthy" } else { "unhealthy" },
        database: if database_ok { "connected" } else { "disconnected" },
        model_loaded: ctx.forecaster.is_loaded().await,
    })
}

async fn docs() -> Json<Value> {
    let endpoints: Vec<Value> = ENDPOINTS
        .iter()
        .map(|(method, path, summary)| json!({ "method": method, "path": path, "summary": summary }))
        .collect();
    Json(json!({
        "title": "Sales Forecast API",
        "description": "Predicts product sales from historical Northwind data",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": endpoints,
    }))
}
