//! Order detail entity - One product line within an order.
//!
//! The primary key is the (`order_id`, `product_id`) pair. Revenue for a line
//! is `quantity * unit_price * (1 - discount)`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order line database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_details")]
pub struct Model {
    /// Order this line belongs to
    #[sea_orm(primary_key, auto_increment = false)]
    pub order_id: i32,
    /// Product sold on this line
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: i32,
    /// Price charged per unit on this order
    pub unit_price: f64,
    /// Units sold
    pub quantity: i32,
    /// Fractional discount in `[0, 1)`
    pub discount: f64,
}

/// Defines relationships between `OrderDetail` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each line belongs to one order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::OrderId"
    )]
    Order,
    /// Each line references one product
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::ProductId"
    )]
    Product,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
