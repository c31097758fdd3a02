//! Product entity - Items that can be ordered and forecast.
//!
//! Each product optionally belongs to a category and a supplier. The
//! `discontinued` flag is stored as an integer (0 or 1) to match the
//! Northwind schema.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Unique identifier for the product
    #[sea_orm(primary_key)]
    pub product_id: i32,
    /// Name of the product (e.g., "Chai")
    pub product_name: String,
    /// ID of the supplier, if known
    pub supplier_id: Option<i32>,
    /// ID of the category, if known
    pub category_id: Option<i32>,
    /// Packaging description (e.g., "10 boxes x 20 bags")
    pub quantity_per_unit: Option<String>,
    /// Current list price
    pub unit_price: Option<f64>,
    pub units_in_stock: Option<i32>,
    pub units_on_order: Option<i32>,
    pub reorder_level: Option<i32>,
    /// 1 if the product is no longer sold, 0 otherwise
    pub discontinued: i32,
}

/// Defines relationships between Product and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each product belongs to one category
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::CategoryId"
    )]
    Category,
    /// Each product belongs to one supplier
    #[sea_orm(
        belongs_to = "super::supplier::Entity",
        from = "Column::SupplierId",
        to = "super::supplier::Column::SupplierId"
    )]
    Supplier,
    /// One product appears in many order lines
    #[sea_orm(has_many = "super::order_detail::Entity")]
    OrderDetails,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::supplier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Supplier.def()
    }
}

impl Related<super::order_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderDetails.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
