//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use checkout::CheckoutRequest;
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::{AppState, AppStore};

/// Header carrying the client's idempotency token.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub user_id: String,
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    #[serde(skip_serializing_if = "is_false")]
    pub duplicate: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Picks the token from the header or the body. Both present must agree.
fn token_from(headers: &HeaderMap, body: Option<String>) -> Result<Option<String>, ApiError> {
    let header = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            value.to_str().map(str::to_string).map_err(|_| {
                ApiError::BadRequest("Idempotency-Key header is not valid text".to_string())
            })
        })
        .transpose()?;

    match (header, body) {
        (Some(h), Some(b)) if h != b => Err(ApiError::BadRequest(
            "Idempotency-Key header and idempotencyKey field disagree".to_string(),
        )),
        (Some(h), _) => Ok(Some(h)),
        (None, b) => Ok(b),
    }
}

/// POST /checkout — buy a quantity of one product exactly once per token.
///
/// Answers 200 with `{"orderId"}` for a new order and with
/// `{"orderId", "duplicate": true}` when the token was already fulfilled.
#[tracing::instrument(skip_all)]
pub async fn checkout<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let Json(req) = body?;
    let token = token_from(&headers, req.idempotency_key)?;

    let request = CheckoutRequest::parse(
        &req.user_id,
        &req.product_id,
        req.quantity,
        token.as_deref(),
    )?;

    let outcome = state.orchestrator.checkout(request).await?;

    Ok(Json(CheckoutResponse {
        order_id: outcome.order_id(),
        duplicate: outcome.is_duplicate(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_str(token).unwrap());
        headers
    }

    #[test]
    fn header_or_body_supplies_the_token() {
        assert_eq!(
            token_from(&headers_with("h-1"), None).unwrap().as_deref(),
            Some("h-1")
        );
        assert_eq!(
            token_from(&HeaderMap::new(), Some("b-1".to_string()))
                .unwrap()
                .as_deref(),
            Some("b-1")
        );
        assert!(token_from(&HeaderMap::new(), None).unwrap().is_none());
    }

    #[test]
    fn agreeing_header_and_body_are_accepted() {
        let token = token_from(&headers_with("same"), Some("same".to_string())).unwrap();
        assert_eq!(token.as_deref(), Some("same"));
    }

    #[test]
    fn conflicting_header_and_body_are_rejected() {
        let err = token_from(&headers_with("one"), Some("two".to_string())).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn duplicate_flag_is_omitted_for_new_orders() {
        let order_id = OrderId::new();
        let fresh = serde_json::to_value(CheckoutResponse {
            order_id,
            duplicate: false,
        })
        .unwrap();
        assert_eq!(fresh, serde_json::json!({ "orderId": order_id.to_string() }));

        let replay = serde_json::to_value(CheckoutResponse {
            order_id,
            duplicate: true,
        })
        .unwrap();
        assert_eq!(replay["duplicate"], true);
    }
}
