//! Idempotency tokens.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId};

use crate::error::CheckoutError;

/// Longest accepted token, in bytes.
pub const MAX_TOKEN_LEN: usize = 255;

/// Width of the time bucket used by [`derive_legacy_key`].
pub const LEGACY_BUCKET_SECS: i64 = 300;

/// Opaque client-generated identifier of one logical purchase attempt.
///
/// Only the shape is checked: 1 to 255 characters drawn from ASCII
/// alphanumerics and `_ - : .`. The server never decodes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    /// Validates a token.
    pub fn parse(raw: &str) -> Result<Self, CheckoutError> {
        if raw.is_empty() {
            return Err(CheckoutError::Validation(
                "idempotency key must not be empty".to_string(),
            ));
        }
        if raw.len() > MAX_TOKEN_LEN {
            return Err(CheckoutError::Validation(format!(
                "idempotency key must be at most {MAX_TOKEN_LEN} characters"
            )));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.'))
        {
            return Err(CheckoutError::Validation(
                "idempotency key contains unsupported characters".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives a key from the request fields and a 5-minute time bucket.
///
/// Weak fallback for clients that send no token. Two distinct purchases of
/// the same product and quantity by one user inside a bucket collapse into
/// one order, and a retry that crosses a bucket boundary executes twice.
pub fn derive_legacy_key(
    user_id: UserId,
    product_id: ProductId,
    quantity: i32,
    at: DateTime<Utc>,
) -> IdempotencyToken {
    let bucket = at.timestamp().div_euclid(LEGACY_BUCKET_SECS);
    IdempotencyToken(format!("checkout_{user_id}_{product_id}_{quantity}_{bucket}"))
}
