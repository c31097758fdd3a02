//! Entity module - Contains all SeaORM entity definitions for the Northwind tables.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod category;
pub mod customer;
pub mod order;
pub mod order_detail;
pub mod product;
pub mod supplier;

// Re-export specific types to avoid conflicts
pub use category::{Column as CategoryColumn, Entity as Category, Model as CategoryModel};
pub use customer::{Column as CustomerColumn, Entity as Customer, Model as CustomerModel};
pub use order::{Column as OrderColumn, Entity as Order, Model as OrderModel};
pub use order_detail::{
    Column as OrderDetailColumn, Entity as OrderDetail, Model as OrderDetailModel,
};
pub use product::{Column as ProductColumn, Entity as Product, Model as ProductModel};
pub use supplier::{Column as SupplierColumn, Entity as Supplier, Model as SupplierModel};
