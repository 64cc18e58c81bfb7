//! Persistence layer for the checkout service.
//!
//! Exposes the three contracts the checkout orchestrator coordinates
//! ([`InventoryStore`], [`IdempotencyRegistry`], [`OrderLedger`]) bundled in a
//! [`UnitOfWork`], plus the plain [`Catalog`] CRUD surface. Both a PostgreSQL
//! and an in-memory implementation are provided.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    KeyRecord, MAX_MONEY, NewOrder, NewProduct, NewStore, NewUser, Order, PURPOSE_ORDER, Product,
    StockChange, StockDecrement, Store, User,
};
pub use postgres::{PgUnitOfWork, PostgresStore};
pub use store::{Catalog, CheckoutStore, IdempotencyRegistry, InventoryStore, OrderLedger, UnitOfWork};
