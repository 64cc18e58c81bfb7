//! Identifier types shared by the storage, checkout and API layers.

mod types;

pub use types::{IdempotencyKeyId, OrderId, ProductId, StoreId, UserId};
