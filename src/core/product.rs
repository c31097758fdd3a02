//! Product business logic - Listing, lookup and creation of catalogue products.
//!
//! Products are the unit of forecasting: every prediction targets one product and
//! every training sample is one product-month. All functions are async and return
//! Result types for proper error handling throughout the system.

use crate::{
    entities::{Category, Customer, Product, Supplier, customer, product},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use serde::Deserialize;
use tracing::{info, instrument};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u64 = 100;
/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u64 = 1000;
/// Longest accepted product name (Northwind column width).
pub const MAX_PRODUCT_NAME_LEN: usize = 40;

/// Filtering and pagination for product listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    /// Rows to skip
    pub skip: Option<u64>,
    /// Maximum rows to return
    pub limit: Option<u64>,
    /// Only products in this category
    pub category_id: Option<i32>,
    /// Only discontinued (`true`) or active (`false`) products
    pub discontinued: Option<bool>,
}

/// Input for creating a product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    /// Product name, trimmed before storing
    pub product_name: String,
    /// List price
    pub unit_price: f64,
    /// Must reference an existing category
    pub category_id: Option<i32>,
    /// Must reference an existing supplier
    pub supplier_id: Option<i32>,
    /// Free-form packaging, e.g. "10 boxes x 20 bags"
    pub quantity_per_unit: Option<String>,
    pub units_in_stock: Option<i32>,
    pub units_on_order: Option<i32>,
    pub reorder_level: Option<i32>,
    /// 0 for active, 1 for discontinued
    #[serde(default)]
    pub discontinued: i32,
}

/// Lists products ordered by id, applying the optional filters and pagination.
///
/// # Errors
/// Returns an error if the database query fails.
#[instrument(skip(db))]
pub async fn list_products(
    db: &DatabaseConnection,
    filter: &ProductFilter,
) -> Result<Vec<product::Model>> {
    let mut query = Product::find().order_by_asc(product::Column::ProductId);

    if let Some(category_id) = filter.category_id {
        query = query.filter(product::Column::CategoryId.eq(category_id));
    }
    if let Some(discontinued) = filter.discontinued {
        query = query.filter(product::Column::Discontinued.eq(i32::from(discontinued)));
    }

    let limit = filter
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);
    query
        .offset(filter.skip.unwrap_or(0))
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a specific product by its unique ID.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn get_product(db: &DatabaseConnection, product_id: i32) -> Result<Option<product::Model>> {
    Product::find_by_id(product_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Like [`get_product`] but a missing product is an error.
///
/// # Errors
/// Returns [`Error::ProductNotFound`] if no product has this id.
pub async fn require_product(db: &DatabaseConnection, product_id: i32) -> Result<product::Model> {
    get_product(db, product_id)
        .await?
        .ok_or(Error::ProductNotFound { product_id })
}

/// Looks up a customer by code.
pub async fn find_customer(
    db: &DatabaseConnection,
    customer_id: &str,
) -> Result<Option<customer::Model>> {
    Ok(Customer::find_by_id(customer_id.to_string()).one(db).await?)
}

/// Creates a new product after validating the input.
///
/// # Errors
/// Returns an error if:
/// - The product name is empty or longer than 40 characters
/// - The price is negative or not finite (NaN, infinity)
/// - A stock field is negative or `discontinued` is not 0 or 1
/// - The referenced category or supplier does not exist
/// - The database insert operation fails
#[instrument(skip(db))]
pub async fn create_product(db: &DatabaseConnection, new: NewProduct) -> Result<product::Model> {
    let name = new.product_name.trim();
    if name.is_empty() {
        return Err(Error::Validation {
            message: "Product name cannot be empty".to_string(),
        });
    }
    if name.chars().count() > MAX_PRODUCT_NAME_LEN {
        return Err(Error::Validation {
            message: format!("Product name cannot exceed {MAX_PRODUCT_NAME_LEN} characters"),
        });
    }
    if !new.unit_price.is_finite() || new.unit_price < 0.0 {
        return Err(Error::Validation {
            message: format!("Invalid unit price: {}", new.unit_price),
        });
    }
    for (field, value) in [
        ("units_in_stock", new.units_in_stock),
        ("units_on_order", new.units_on_order),
        ("reorder_level", new.reorder_level),
    ] {
        if value.is_some_and(|v| v < 0) {
            return Err(Error::Validation {
                message: format!("{field} cannot be negative"),
            });
        }
    }
    if !matches!(new.discontinued, 0 | 1) {
        return Err(Error::Validation {
            message: "discontinued must be 0 or 1".to_string(),
        });
    }

    if let Some(category_id) = new.category_id {
        if Category::find_by_id(category_id).one(db).await?.is_none() {
            return Err(Error::Validation {
                message: format!("Category {category_id} does not exist"),
            });
        }
    }
    if let Some(supplier_id) = new.supplier_id {
        if Supplier::find_by_id(supplier_id).one(db).await?.is_none() {
            return Err(Error::Validation {
                message: format!("Supplier {supplier_id} does not exist"),
            });
        }
    }

    let product = product::ActiveModel {
        product_name: Set(name.to_string()),
        supplier_id: Set(new.supplier_id),
        category_id: Set(new.category_id),
        quantity_per_unit: Set(new.quantity_per_unit),
        unit_price: Set(Some(new.unit_price)),
        units_in_stock: Set(new.units_in_stock),
        units_on_order: Set(new.units_on_order),
        reorder_level: Set(new.reorder_level),
        discontinued: Set(new.discontinued),
        ..Default::default()
    };
    let created = product.insert(db).await?;
    info!(
        "Created product {} '{}'",
        created.product_id, created.product_name
    );
    Ok(created)
}
