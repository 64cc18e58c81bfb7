//! API error types with HTTP response mapping.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use storage::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout ended without a committed order.
    Checkout(CheckoutError),
    /// Catalog read or write failed.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        let mut response = (status, axum::Json(body)).into_response();
        if matches!(
            status,
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        CheckoutError::NotFound { entity, .. } => {
            (StatusCode::NOT_FOUND, format!("{entity} not found"))
        }
        CheckoutError::InsufficientStock { .. } => {
            (StatusCode::CONFLICT, "Not enough stock".to_string())
        }
        CheckoutError::IdempotencyMismatch { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        CheckoutError::TransactionFailure(source) => {
            tracing::error!(error = %source, "checkout transaction failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Checkout could not be completed, please retry".to_string(),
            )
        }
        CheckoutError::Timeout(deadline) => {
            tracing::error!(?deadline, "checkout deadline expired");
            (
                StatusCode::GATEWAY_TIMEOUT,
                "Checkout timed out, please retry".to_string(),
            )
        }
        CheckoutError::CommitFailure(source) => {
            tracing::error!(error = %source, "checkout commit failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Order status unknown, retry with the same idempotency key".to_string(),
            )
        }
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::NotFound { entity, .. } => {
            (StatusCode::NOT_FOUND, format!("{entity} not found"))
        }
        StoreError::Conflict(_) => (StatusCode::CONFLICT, "Resource already exists".to_string()),
        StoreError::InvalidValue(detail) => {
            tracing::warn!(%detail, "value rejected by the store");
            (StatusCode::BAD_REQUEST, "Value out of range".to_string())
        }
        StoreError::InvalidReference(_) => (
            StatusCode::BAD_REQUEST,
            "Referenced resource does not exist".to_string(),
        ),
        _ => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::ProductId;

    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn checkout_errors_map_to_distinct_statuses() {
        let cases = [
            (
                CheckoutError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CheckoutError::NotFound {
                    entity: "Product",
                    id: "x".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                CheckoutError::InsufficientStock {
                    product_id: ProductId::new(),
                    requested: 3,
                    available: 1,
                },
                StatusCode::CONFLICT,
            ),
            (
                CheckoutError::IdempotencyMismatch {
                    key: "k".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CheckoutError::TransactionFailure(StoreError::Unavailable("down".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CheckoutError::Timeout(Duration::from_secs(5)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                CheckoutError::CommitFailure(StoreError::Unavailable("lost".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(status_of(ApiError::from(err)), expected);
        }
    }

    #[test]
    fn retryable_failures_carry_retry_after() {
        let response =
            ApiError::from(CheckoutError::Timeout(Duration::from_secs(5))).into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");

        let response = ApiError::BadRequest("nope".to_string()).into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn store_errors_do_not_leak_details() {
        assert_eq!(
            status_of(ApiError::from(StoreError::Conflict(
                "uq_users_email".to_string()
            ))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ApiError::from(StoreError::InvalidValue(
                "numeric field overflow".to_string()
            ))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::from(StoreError::Unavailable(
                "pool timed out".to_string()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
