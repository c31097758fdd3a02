//! Shared test utilities for the sales forecast service.
//!
//! This module provides common helpers for setting up in-memory databases and
//! seeding a small, deterministic Northwind-style dataset.
//!
//! # Sample data
//! * Categories: 1 Beverages, 2 Condiments, 3 Seafood
//! * Suppliers: 1 Exotic Liquids, 2 New Orleans Cajun Delights
//! * Customers: VINET, TOMSP, HANAR
//! * Products 1-5 sell every month; 5 is discontinued; 6 never sells;
//!   7 has no category or supplier
//! * Twelve orders, one per month of 1997 on the 15th, each buying products 1-5 and 7.
//!   Line quantity is [`sample_quantity`]; every third month carries a 5% discount.

use crate::{
    entities::{category, customer, order, order_detail, product, supplier},
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

/// Number of products seeded by [`seed_northwind_sample`].
pub const SAMPLE_PRODUCT_COUNT: i32 = 7;
/// Number of orders seeded, one per month.
pub const SAMPLE_ORDER_COUNT: usize = 12;
/// Product without category or supplier; its sales never reach the aggregates.
pub const UNCATEGORISED_PRODUCT_ID: i32 = 7;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// In-memory database filled with the sample dataset.
pub async fn setup_seeded_db() -> Result<DatabaseConnection> {
    let db = setup_test_db().await?;
    seed_northwind_sample(&db).await?;
    Ok(db)
}

/// Routes `tracing` output through the test harness; safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .try_init();
}

/// Units of `product_id` sold in month index `month_index` (0 = January).
#[must_use]
pub const fn sample_quantity(product_id: i32, month_index: i32) -> i32 {
    10 + (3 * product_id + 2 * month_index) % 17
}

/// Inserts the sample dataset described in the module docs.
pub async fn seed_northwind_sample(db: &DatabaseConnection) -> Result<()> {
    let categories = [
        (1, "Beverages", "Soft drinks, coffees, teas, beers, and ales"),
        (2, "Condiments", "Sweet and savory sauces, relishes, spreads, and seasonings"),
        (3, "Seafood", "Seaweed and fish"),
    ];
    category::Entity::insert_many(categories.map(|(id, name, description)| {
        category::ActiveModel {
            category_id: Set(id),
            category_name: Set(name.to_string()),
            description: Set(Some(description.to_string())),
        }
    }))
    .exec(db)
    .await?;

    let suppliers = [
        (1, "Exotic Liquids", "London", "UK"),
        (2, "New Orleans Cajun Delights", "New Orleans", "USA"),
    ];
    supplier::Entity::insert_many(suppliers.map(|(id, name, city, country)| {
        supplier::ActiveModel {
            supplier_id: Set(id),
            company_name: Set(name.to_string()),
            city: Set(Some(city.to_string())),
            country: Set(Some(country.to_string())),
            ..Default::default()
        }
    }))
    .exec(db)
    .await?;

    let customers = [
        ("VINET", "Vins et alcools Chevalier", "Reims", "France"),
        ("TOMSP", "Toms Spezialitäten", "Münster", "Germany"),
        ("HANAR", "Hanari Carnes", "Rio de Janeiro", "Brazil"),
    ];
    customer::Entity::insert_many(customers.map(|(id, name, city, country)| {
        customer::ActiveModel {
            customer_id: Set(id.to_string()),
            company_name: Set(name.to_string()),
            contact_name: Set(None),
            city: Set(Some(city.to_string())),
            country: Set(Some(country.to_string())),
        }
    }))
    .exec(db)
    .await?;

    let products = [
        (1, "Chai", Some(1), Some(1), 18.0, 0),
        (2, "Chang", Some(1), Some(1), 19.0, 0),
        (3, "Aniseed Syrup", Some(2), Some(1), 10.0, 0),
        (4, "Chef Anton's Cajun Seasoning", Some(2), Some(2), 22.0, 0),
        (5, "Chef Anton's Gumbo Mix", Some(2), Some(2), 21.35, 1),
        (6, "Ikura", Some(3), Some(2), 31.0, 0),
        (7, "Unfiled Sampler", None, None, 5.0, 0),
    ];
    product::Entity::insert_many(products.map(
        |(id, name, category_id, supplier_id, price, discontinued)| product::ActiveModel {
            product_id: Set(id),
            product_name: Set(name.to_string()),
            category_id: Set(category_id),
            supplier_id: Set(supplier_id),
            quantity_per_unit: Set(None),
            unit_price: Set(Some(price)),
            units_in_stock: Set(Some(20)),
            units_on_order: Set(Some(0)),
            reorder_level: Set(Some(5)),
            discontinued: Set(discontinued),
        },
    ))
    .exec(db)
    .await?;

    let customer_ids = ["VINET", "TOMSP", "HANAR"];
    let mut orders = Vec::new();
    let mut lines = Vec::new();
    for (month_index, month) in (0..12).zip(1..=12u32) {
        let order_id = 10_000 + month_index;
        let order_date = NaiveDate::from_ymd_opt(1997, month, 15)
            .and_then(|d| d.and_hms_opt(0, 0, 0));
        orders.push(order::ActiveModel {
            order_id: Set(order_id),
            customer_id: Set(Some(customer_ids[(month as usize - 1) % 3].to_string())),
            employee_id: Set(Some(1)),
            order_date: Set(order_date),
            required_date: Set(None),
            shipped_date: Set(None),
            freight: Set(Some(12.5)),
            ship_country: Set(None),
        });

        let discount = if month_index % 3 == 2 { 0.05 } else { 0.0 };
        for (product_id, _, _, _, price, _) in products {
            if product_id == 6 {
                continue;
            }
            lines.push(order_detail::ActiveModel {
                order_id: Set(order_id),
                product_id: Set(product_id),
                unit_price: Set(price),
                quantity: Set(sample_quantity(product_id, month_index)),
                discount: Set(discount),
            });
        }
    }
    order::Entity::insert_many(orders).exec(db).await?;
    order_detail::Entity::insert_many(lines).exec(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{OrderDetail, Product};
    use sea_orm::PaginatorTrait;

    #[tokio::test]
    async fn test_seed_counts() -> Result<()> {
        let db = setup_seeded_db().await?;
        assert_eq!(Product::find().count(&db).await?, 7);
        assert_eq!(OrderDetail::find().count(&db).await?, 6 * 12);
        Ok(())
    }

    #[test]
    fn test_sample_quantity_range() {
        for product_id in 1..=7 {
            for month_index in 0..12 {
                assert!((10..27).contains(&sample_quantity(product_id, month_index)));
            }
        }
    }
}
