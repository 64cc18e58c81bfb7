use common::ProductId;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The conditional decrement found fewer units than requested.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// Another attempt already registered this idempotency key.
    #[error("Idempotency key already registered: {0}")]
    DuplicateKey(String),

    /// A unique constraint other than the idempotency key was violated.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    /// A foreign key pointed at a row that does not exist.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// A value was outside its column's range or failed a check constraint.
    #[error("Value rejected: {0}")]
    InvalidValue(String),

    /// The store refused the operation without a database error to report.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
