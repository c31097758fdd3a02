//! Customer entity - Buyers referenced by orders.
//!
//! Northwind customer ids are short uppercase codes such as `"VINET"`, so the
//! primary key is a string and never auto-incremented.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Customer database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    /// Customer code (e.g., `"VINET"`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub customer_id: String,
    /// Company name
    pub company_name: String,
    /// Contact person
    pub contact_name: Option<String>,
    /// City of the customer
    pub city: Option<String>,
    /// Country of the customer
    pub country: Option<String>,
}

/// Defines relationships between Customer and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One customer places many orders
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
