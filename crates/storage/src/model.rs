//! Rows of the checkout schema.

use chrono::{DateTime, Utc};
use common::{IdempotencyKeyId, OrderId, ProductId, StoreId, UserId};
use rust_decimal::Decimal;

/// Purpose tag recorded on idempotency keys created by checkout.
pub const PURPOSE_ORDER: &str = "order";

/// Largest amount a `NUMERIC(12,2)` money column holds: 9,999,999,999.99.
pub const MAX_MONEY: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

/// A registered user.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Opaque credential. Never leaves the service.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// A store that lists products.
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStore {
    pub name: String,
    pub owner_id: UserId,
}

/// A product with limited stock.
///
/// `stock` is never negative in a committed state.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub store_id: StoreId,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

/// Result of an administrative absolute stock set.
#[derive(Debug, Clone, PartialEq)]
pub struct StockChange {
    pub product_id: ProductId,
    pub old_stock: i32,
    pub new_stock: i32,
    pub updated_at: DateTime<Utc>,
}

/// Values read from the product row locked by a conditional decrement.
#[derive(Debug, Clone, PartialEq)]
pub struct StockDecrement {
    pub product_id: ProductId,
    pub store_id: StoreId,
    /// Stock remaining after the decrement.
    pub remaining: i32,
    /// Unit price read from the same locked row.
    pub unit_price: Decimal,
}

/// A registered idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRecord {
    pub id: IdempotencyKeyId,
    pub key: String,
    pub purpose: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A committed purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub quantity: i32,
    pub total_price: Decimal,
    pub idempotency_key_id: IdempotencyKeyId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub quantity: i32,
    pub total_price: Decimal,
    pub idempotency_key_id: IdempotencyKeyId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_money_matches_the_column_precision() {
        assert_eq!(MAX_MONEY, Decimal::new(999_999_999_999, 2));
        assert_eq!(MAX_MONEY.to_string(), "9999999999.99");
    }
}
