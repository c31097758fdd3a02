/// Feature matrices for training and single-request prediction
pub mod features;
/// Model training, persistence and prediction
pub mod forecast;
/// Product catalogue operations
pub mod product;
/// Sales extraction, cleaning and aggregation
pub mod sales;
