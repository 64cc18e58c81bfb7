use async_trait::async_trait;
use common::{IdempotencyKeyId, ProductId, StoreId, UserId};

use crate::{
    KeyRecord, NewOrder, NewProduct, NewStore, NewUser, Order, Product, Result, StockChange,
    StockDecrement, Store, User,
};

/// Product stock as seen from inside a unit of work.
#[async_trait]
pub trait InventoryStore: Send {
    /// Reads a product.
    ///
    /// Fails with `NotFound` if the product doesn't exist.
    async fn get_product(&mut self, id: ProductId) -> Result<Product>;

    /// Decrements stock by `quantity` only if at least `quantity` units remain.
    ///
    /// The sufficiency check and the mutation are indivisible with respect to
    /// other units of work touching the same product. Returns the remaining
    /// stock together with the price read from the locked row.
    ///
    /// Fails with `InsufficientStock` or `NotFound`.
    async fn conditional_decrement(
        &mut self,
        id: ProductId,
        quantity: i32,
    ) -> Result<StockDecrement>;
}

/// Durable map from deduplication key to the attempt that registered it.
#[async_trait]
pub trait IdempotencyRegistry: Send {
    /// Looks up a key by its string value.
    async fn find_by_key(&mut self, key: &str) -> Result<Option<KeyRecord>>;

    /// Registers a key.
    ///
    /// Uniqueness is enforced by the store itself. A key registered by a
    /// concurrent attempt fails with `DuplicateKey`.
    async fn insert_key(&mut self, key: &str, purpose: &str, user_id: UserId) -> Result<KeyRecord>;

    /// Returns the order created under a key, if any.
    async fn find_order_by_key_id(&mut self, key_id: IdempotencyKeyId) -> Result<Option<Order>>;
}

/// Append-only record of completed purchases.
#[async_trait]
pub trait OrderLedger: Send {
    /// Inserts an order. At most one order may reference a given key.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;
}

/// A bounded set of mutations that commit or roll back together.
///
/// Dropping a unit of work without calling [`commit`](UnitOfWork::commit)
/// rolls it back.
#[async_trait]
pub trait UnitOfWork: InventoryStore + IdempotencyRegistry + OrderLedger {
    /// Returns true if the user exists.
    async fn user_exists(&mut self, id: UserId) -> Result<bool>;

    /// Makes every mutation of this unit of work visible at once.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every mutation of this unit of work.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Factory for units of work.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// Plain CRUD over users, stores and products.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Creates a user. A taken email fails with `Conflict`.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    /// Creates a store. An unknown owner fails with `InvalidReference`.
    async fn create_store(&self, store: NewStore) -> Result<Store>;

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>>;

    async fn list_stores(&self) -> Result<Vec<Store>>;

    /// Creates a product. An unknown store fails with `InvalidReference`.
    async fn create_product(&self, product: NewProduct) -> Result<Product>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Overwrites a product's stock with an absolute value.
    ///
    /// Administrative restocking only; checkout never goes through here.
    async fn set_stock(&self, id: ProductId, stock: i32) -> Result<StockChange>;
}
