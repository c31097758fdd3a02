//! Feature engineering for training and prediction.
//!
//! A training sample is one product-month from the monthly sales summary. Columns
//! are `product_id, year, month, total_revenue, avg_price` followed by one-hot
//! `category_<id>` and `supplier_<id>` columns in ascending id order. The target
//! is the month's total quantity.

use crate::{
    core::{
        forecast::PredictionRequest,
        product::{find_customer, require_product},
        sales::{MonthlySales, monthly_sales_summary, product_sales_averages},
    },
    entities::{Category, Supplier, product},
    errors::{Error, Result},
    ml::preprocessing::replace_outliers_with_median,
};
use chrono::Datelike;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};

/// Leading numeric columns, in order.
pub const BASE_FEATURES: [&str; 5] = ["product_id", "year", "month", "total_revenue", "avg_price"];

/// Assumed quantity when estimating revenue for a product that never sold.
const FALLBACK_QUANTITY: f64 = 10.0;

/// Design matrix with named columns and its target vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl FeatureMatrix {
    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copies the rows and targets at `indices`.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
        indices
            .iter()
            .map(|&i| (self.rows[i].clone(), self.target[i]))
            .unzip()
    }
}

fn category_feature(id: i32) -> String {
    format!("category_{id}")
}

fn supplier_feature(id: i32) -> String {
    format!("supplier_{id}")
}

/// Builds the training matrix from a monthly summary. `None` when it is empty.
///
/// Outliers in `total_quantity`, `total_revenue` and `avg_price` are replaced by
/// the column median first.
#[must_use]
pub fn build_training_matrix(summary: &[MonthlySales]) -> Option<FeatureMatrix> {
    if summary.is_empty() {
        return None;
    }

    let mut quantity: Vec<f64> = summary.iter().map(|s| s.total_quantity).collect();
    let mut revenue: Vec<f64> = summary.iter().map(|s| s.total_revenue).collect();
    let mut price: Vec<f64> = summary.iter().map(|s| s.avg_price).collect();
    for (name, column) in [
        ("total_quantity", &mut quantity),
        ("total_revenue", &mut revenue),
        ("avg_price", &mut price),
    ] {
        let replaced = replace_outliers_with_median(column);
        if replaced > 0 {
            debug!("Replaced {replaced} outliers in {name}");
        }
    }

    let categories: BTreeSet<i32> = summary.iter().map(|s| s.category_id).collect();
    let suppliers: BTreeSet<i32> = summary.iter().map(|s| s.supplier_id).collect();

    let feature_names: Vec<String> = BASE_FEATURES
        .iter()
        .map(ToString::to_string)
        .chain(categories.iter().map(|&id| category_feature(id)))
        .chain(suppliers.iter().map(|&id| supplier_feature(id)))
        .collect();

    let rows = summary
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut row = vec![
                f64::from(s.product_id),
                f64::from(s.year),
                f64::from(s.month),
                revenue[i],
                price[i],
            ];
            row.extend(categories.iter().map(|&id| one_hot(id == s.category_id)));
            row.extend(suppliers.iter().map(|&id| one_hot(id == s.supplier_id)));
            row
        })
        .collect();

    Some(FeatureMatrix {
        feature_names,
        rows,
        target: quantity,
    })
}

const fn one_hot(hit: bool) -> f64 {
    if hit { 1.0 } else { 0.0 }
}

/// Builds the training matrix from every sale in the database.
///
/// # Errors
/// Returns an error if a database query fails.
#[instrument(skip(db))]
pub async fn prepare_training_data(db: &DatabaseConnection) -> Result<Option<FeatureMatrix>> {
    let summary = monthly_sales_summary(db, None, None).await?;
    let matrix = build_training_matrix(&summary);
    if let Some(matrix) = &matrix {
        info!(
            "Prepared {} training samples with {} features",
            matrix.len(),
            matrix.feature_names.len()
        );
    }
    Ok(matrix)
}

/// Computes the named feature values for one prediction request.
///
/// Returns the product alongside the features so callers can report its name.
///
/// # Errors
/// Returns [`Error::ProductNotFound`] for an unknown product, a validation error
/// for a negative or non-finite quantity or override, and database errors. An
/// unknown customer is logged and otherwise ignored.
#[instrument(skip(db))]
pub async fn prepare_prediction_features(
    db: &DatabaseConnection,
    request: &PredictionRequest,
) -> Result<(product::Model, BTreeMap<String, f64>)> {
    let product = require_product(db, request.product_id).await?;
    if let Some(customer_id) = &request.customer_id {
        match find_customer(db, customer_id).await? {
            Some(customer) => debug!(
                "Predicting for customer {} ({})",
                customer.customer_id,
                customer.country.as_deref().unwrap_or("unknown country")
            ),
            None => warn!("Unknown customer '{}', predicting without it", customer_id),
        }
    }
    if let Some(quantity) = request.quantity {
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(Error::Validation {
                message: format!("quantity must be a non-negative number, got {quantity}"),
            });
        }
    }

    let averages = product_sales_averages(db, product.product_id).await?;
    let unit_price = product
        .unit_price
        .or(averages.map(|a| a.avg_unit_price))
        .unwrap_or(0.0);
    let total_revenue = match (request.quantity, averages) {
        (Some(quantity), _) => unit_price * quantity,
        (None, Some(averages)) => averages.avg_revenue,
        (None, None) => unit_price * FALLBACK_QUANTITY,
    };

    let mut features = BTreeMap::from([
        ("product_id".to_string(), f64::from(product.product_id)),
        ("year".to_string(), f64::from(request.order_date.year())),
        ("month".to_string(), f64::from(request.order_date.month())),
        ("total_revenue".to_string(), total_revenue),
        ("avg_price".to_string(), unit_price),
    ]);
    for category in Category::find().all(db).await? {
        features.insert(
            category_feature(category.category_id),
            one_hot(product.category_id == Some(category.category_id)),
        );
    }
    for supplier in Supplier::find().all(db).await? {
        features.insert(
            supplier_feature(supplier.supplier_id),
            one_hot(product.supplier_id == Some(supplier.supplier_id)),
        );
    }

    for (name, value) in &request.features {
        if !value.is_finite() {
            return Err(Error::Validation {
                message: format!("feature '{name}' must be a finite number"),
            });
        }
        features.insert(name.clone(), *value);
    }

    Ok((product, features))
}

/// Orders named values by `feature_names`; unknown names are ignored and
/// missing ones are zero.
#[must_use]
pub fn align(named: &BTreeMap<String, f64>, feature_names: &[String]) -> Vec<f64> {
    feature_names
        .iter()
        .map(|name| named.get(name).copied().unwrap_or(0.0))
        .collect()
}
