//! Order entity - Order headers carrying the order date used for forecasting.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    /// Unique identifier for the order
    #[sea_orm(primary_key)]
    pub order_id: i32,
    /// Customer who placed the order
    pub customer_id: Option<String>,
    /// Employee who took the order
    pub employee_id: Option<i32>,
    /// When the order was placed; rows without a date are excluded from sales data
    pub order_date: Option<DateTime>,
    pub required_date: Option<DateTime>,
    pub shipped_date: Option<DateTime>,
    /// Shipping cost
    pub freight: Option<f64>,
    pub ship_country: Option<String>,
}

/// Defines relationships between Order and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each order belongs to one customer
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::CustomerId"
    )]
    Customer,
    /// One order has many lines
    #[sea_orm(has_many = "super::order_detail::Entity")]
    OrderDetails,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::order_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderDetails.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
