//! Validated checkout requests.

use common::{ProductId, UserId};

use crate::error::CheckoutError;
use crate::token::IdempotencyToken;

/// A positive number of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(i32);

impl Quantity {
    /// Accepts integers in `1..=i32::MAX`.
    pub fn new(value: i64) -> Result<Self, CheckoutError> {
        if value <= 0 {
            return Err(CheckoutError::Validation(format!(
                "quantity must be greater than zero, got {value}"
            )));
        }
        i32::try_from(value)
            .map(Self)
            .map_err(|_| CheckoutError::Validation(format!("quantity {value} is too large")))
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

/// A purchase intent that passed validation.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Client-supplied token. `None` only when the caller sent none.
    pub token: Option<IdempotencyToken>,
}

impl CheckoutRequest {
    pub fn new(
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
        token: Option<IdempotencyToken>,
    ) -> Self {
        Self {
            user_id,
            product_id,
            quantity,
            token,
        }
    }

    /// Validates raw transport fields.
    pub fn parse(
        user_id: &str,
        product_id: &str,
        quantity: i64,
        token: Option<&str>,
    ) -> Result<Self, CheckoutError> {
        let user_id = UserId::parse(user_id)
            .map_err(|_| CheckoutError::Validation("Invalid user UUID format".to_string()))?;
        let product_id = ProductId::parse(product_id)
            .map_err(|_| CheckoutError::Validation("Invalid product UUID format".to_string()))?;
        let quantity = Quantity::new(quantity)?;
        let token = token.map(IdempotencyToken::parse).transpose()?;

        Ok(Self::new(user_id, product_id, quantity, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_must_be_positive() {
        assert!(matches!(Quantity::new(0), Err(CheckoutError::Validation(_))));
        assert!(matches!(Quantity::new(-3), Err(CheckoutError::Validation(_))));
        assert_eq!(Quantity::new(3).unwrap().get(), 3);
    }

    #[test]
    fn quantity_must_fit_the_column() {
        assert!(Quantity::new(i64::from(i32::MAX)).is_ok());
        assert!(Quantity::new(i64::from(i32::MAX) + 1).is_err());
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        let product = ProductId::new().to_string();
        let err = CheckoutRequest::parse("nope", &product, 1, None).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: Invalid user UUID format");

        let user = UserId::new().to_string();
        let err = CheckoutRequest::parse(&user, "nope", 1, None).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: Invalid product UUID format");
    }

    #[test]
    fn parse_validates_token_shape() {
        let user = UserId::new().to_string();
        let product = ProductId::new().to_string();
        assert!(CheckoutRequest::parse(&user, &product, 1, Some("")).is_err());

        let req = CheckoutRequest::parse(&user, &product, 2, Some("attempt-1")).unwrap();
        assert_eq!(req.quantity.get(), 2);
        assert_eq!(req.token.unwrap().as_str(), "attempt-1");
    }
}
