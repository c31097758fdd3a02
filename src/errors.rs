use thiserror::Error;

/// Crate-wide error type shared by the data, model and API layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Any failure reported by the database driver
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem failure, typically while persisting the model artefact
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Model artefact (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested product does not exist
    #[error("Product with ID {product_id} not found")]
    ProductNotFound {
        /// The missing product id
        product_id: i32,
    },


    /// A sales query produced no rows
    #[error("{message}")]
    NoSalesData {
        /// Which query came back empty
        message: String,
    },

    /// Request input failed validation
    #[error("Validation error: {message}")]
    Validation {
        /// What was rejected
        message: String,
    },

    /// Model type string is not one of the supported estimators
    #[error("Invalid model type '{name}'. Must be one of: decision_tree, linear, knn, logistic")]
    InvalidModelType {
        /// The rejected name
        name: String,
    },

    /// Too few samples to train and evaluate a model
    #[error("Not enough data for training: {samples} samples, at least {required} required")]
    InsufficientData {
        /// Samples available
        samples: usize,
        /// Samples required
        required: usize,
    },

    /// No model has been trained or persisted yet
    #[error("Model is not trained yet. Train it first via /api/retrain")]
    ModelNotTrained,

    /// Estimator fitting or inference failed
    #[error("Training error: {message}")]
    Training {
        /// What went wrong
        message: String,
    },

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
