//! Order pricing in fixed-point decimal.

use rust_decimal::Decimal;
use storage::MAX_MONEY;

use crate::error::CheckoutError;
use crate::request::Quantity;

/// Computes `unit_price × quantity` exactly.
///
/// Totals above [`MAX_MONEY`] cannot be recorded and are rejected.
pub fn order_total(unit_price: Decimal, quantity: Quantity) -> Result<Decimal, CheckoutError> {
    let total = unit_price
        .checked_mul(Decimal::from(quantity.get()))
        .ok_or_else(|| CheckoutError::Validation("order total overflows".to_string()))?;

    if total > MAX_MONEY {
        return Err(CheckoutError::Validation(format!(
            "order total {total} exceeds the maximum of {MAX_MONEY}"
        )));
    }
    Ok(total)
}
