//! Checkout error types.

use std::time::Duration;

use common::ProductId;
use storage::StoreError;
use thiserror::Error;

/// Errors a checkout can end with.
///
/// A lost race on the idempotency key is resolved inside the orchestrator
/// and never appears here.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request was malformed. Rejected before any unit of work opens.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The user or product does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Fewer units remain than requested.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// The token was already used by another user or for another purchase.
    #[error("Idempotency key {key} was already used for a different request")]
    IdempotencyMismatch { key: String },

    /// The unit of work failed and was rolled back. Safe to retry.
    #[error("Checkout transaction failed: {0}")]
    TransactionFailure(#[source] StoreError),

    /// The deadline expired and the unit of work was rolled back. Safe to retry.
    #[error("Checkout timed out after {0:?}")]
    Timeout(Duration),

    /// Every step succeeded but the commit reported an error.
    ///
    /// Whether the order exists is unknown to the caller. Retrying with the
    /// same token replays the order if the commit did land.
    #[error("Checkout commit failed, outcome unknown: {0}")]
    CommitFailure(#[source] StoreError),
}

impl CheckoutError {
    /// Returns true if retrying the same request is safe and may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransactionFailure(_) | Self::Timeout(_) | Self::CommitFailure(_)
        )
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::IdempotencyMismatch { .. } => "idempotency_mismatch",
            Self::TransactionFailure(_) => "transaction_failure",
            Self::Timeout(_) => "timeout",
            Self::CommitFailure(_) => "commit_failure",
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Self::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::InvalidValue(detail) => {
                Self::Validation(format!("value out of range: {detail}"))
            }
            other => Self::TransactionFailure(other),
        }
    }
}
