use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{IdempotencyKeyId, OrderId, ProductId, StoreId, UserId};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    KeyRecord, MAX_MONEY, NewOrder, NewProduct, NewStore, NewUser, Order, Product, Result, StockChange,
    StockDecrement, Store, StoreError, User,
    store::{Catalog, CheckoutStore, IdempotencyRegistry, InventoryStore, OrderLedger, UnitOfWork},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    stores: HashMap<StoreId, Store>,
    products: HashMap<ProductId, Product>,
    keys: HashMap<String, KeyRecord>,
    orders: HashMap<OrderId, Order>,
}

/// Applies the column limits the SQL schema declares for money.
fn check_money(value: Decimal, non_negative_constraint: &str) -> Result<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(StoreError::InvalidValue(non_negative_constraint.to_string()));
    }
    if value > MAX_MONEY {
        return Err(StoreError::InvalidValue(format!(
            "numeric field overflow: {value} exceeds {MAX_MONEY}"
        )));
    }
    Ok(())
}

fn check_stock(stock: i32) -> Result<()> {
    if stock < 0 {
        return Err(StoreError::InvalidValue(
            "ck_products_stock_non_negative".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_insert_order: AtomicBool,
    fail_on_commit: AtomicBool,
    decrement_latency_ms: AtomicU64,
    commit_latency_ms: AtomicU64,
}

/// In-memory store for tests and local development.
///
/// A unit of work holds an exclusive lock on the whole dataset and mutates a
/// private copy, which replaces the shared tables on commit. Units of work
/// are therefore fully serialized, and dropping one discards its copy.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures order inserts to fail.
    pub fn set_fail_on_insert_order(&self, fail: bool) {
        self.faults
            .fail_on_insert_order
            .store(fail, Ordering::SeqCst);
    }

    /// Configures commits to fail after every step succeeded.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.faults.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Delays every conditional decrement, simulating a contended row lock.
    pub fn set_decrement_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.faults.decrement_latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Delays every commit, simulating a slow durable write.
    pub fn set_commit_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.faults.commit_latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Returns the number of committed idempotency keys.
    pub async fn key_count(&self) -> usize {
        self.tables.lock().await.keys.len()
    }

    /// Returns a committed order by ID.
    pub async fn order(&self, id: OrderId) -> Option<Order> {
        self.tables.lock().await.orders.get(&id).cloned()
    }
}

/// A unit of work over [`InMemoryStore`].
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<Faults>,
}

#[async_trait]
impl CheckoutStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }
}

#[async_trait]
impl InventoryStore for MemoryUnitOfWork {
    async fn get_product(&mut self, id: ProductId) -> Result<Product> {
        self.working
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Product", id))
    }

    async fn conditional_decrement(
        &mut self,
        id: ProductId,
        quantity: i32,
    ) -> Result<StockDecrement> {
        let latency = self.faults.decrement_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let product = self
            .working
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;

        if product.stock < quantity {
            return Err(StoreError::InsufficientStock {
                product_id: id,
                requested: quantity,
                available: product.stock,
            });
        }

        product.stock -= quantity;
        product.updated_at = Utc::now();

        Ok(StockDecrement {
            product_id: id,
            store_id: product.store_id,
            remaining: product.stock,
            unit_price: product.price,
        })
    }
}

#[async_trait]
impl IdempotencyRegistry for MemoryUnitOfWork {
    async fn find_by_key(&mut self, key: &str) -> Result<Option<KeyRecord>> {
        Ok(self.working.keys.get(key).cloned())
    }

    async fn insert_key(&mut self, key: &str, purpose: &str, user_id: UserId) -> Result<KeyRecord> {
        if self.working.keys.contains_key(key) {
            return Err(StoreError::DuplicateKey(key.to_string()));
        }
        if !self.working.users.contains_key(&user_id) {
            return Err(StoreError::InvalidReference(
                "idempotency_keys_user_id_fkey".to_string(),
            ));
        }

        let record = KeyRecord {
            id: IdempotencyKeyId::new(),
            key: key.to_string(),
            purpose: purpose.to_string(),
            user_id,
            created_at: Utc::now(),
        };
        self.working.keys.insert(key.to_string(), record.clone());
        Ok(record)
    }

    async fn find_order_by_key_id(&mut self, key_id: IdempotencyKeyId) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .find(|o| o.idempotency_key_id == key_id)
            .cloned())
    }
}

#[async_trait]
impl OrderLedger for MemoryUnitOfWork {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        if self.faults.fail_on_insert_order.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order insert rejected".to_string()));
        }
        check_money(order.total_price, "ck_orders_total_price_non_negative")?;
        if self
            .working
            .orders
            .values()
            .any(|o| o.idempotency_key_id == order.idempotency_key_id)
        {
            return Err(StoreError::Conflict("uq_orders_idempotency_key".to_string()));
        }

        let order = Order {
            id: OrderId::new(),
            user_id: order.user_id,
            product_id: order.product_id,
            store_id: order.store_id,
            quantity: order.quantity,
            total_price: order.total_price,
            idempotency_key_id: order.idempotency_key_id,
            created_at: Utc::now(),
        };
        self.working.orders.insert(order.id, order.clone());
        Ok(order)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn user_exists(&mut self, id: UserId) -> Result<bool> {
        Ok(self.working.users.contains_key(&id))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let latency = self.faults.commit_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.faults.fail_on_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }
        let MemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("uq_users_email".to_string()));
        }

        let user = User {
            id: UserId::new(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<_> = self.tables.lock().await.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn create_store(&self, store: NewStore) -> Result<Store> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&store.owner_id) {
            return Err(StoreError::InvalidReference(
                "stores_owner_id_fkey".to_string(),
            ));
        }

        let store = Store {
            id: StoreId::new(),
            name: store.name,
            owner_id: store.owner_id,
            created_at: Utc::now(),
        };
        tables.stores.insert(store.id, store.clone());
        Ok(store)
    }

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>> {
        Ok(self.tables.lock().await.stores.get(&id).cloned())
    }

    async fn list_stores(&self) -> Result<Vec<Store>> {
        let mut stores: Vec<_> = self.tables.lock().await.stores.values().cloned().collect();
        stores.sort_by_key(|s| s.created_at);
        Ok(stores)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        check_money(product.price, "ck_products_price_non_negative")?;
        check_stock(product.stock)?;

        let mut tables = self.tables.lock().await;
        if !tables.stores.contains_key(&product.store_id) {
            return Err(StoreError::InvalidReference(
                "products_store_id_fkey".to_string(),
            ));
        }

        let now = Utc::now();
        let product = Product {
            id: ProductId::new(),
            store_id: product.store_id,
            name: product.name,
            price: product.price,
            stock: product.stock,
            created_at: now,
            updated_at: now,
        };
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let mut products: Vec<_> = self
            .tables
            .lock()
            .await
            .products
            .values()
            .cloned()
            .collect();
        products.sort_by_key(|p| p.created_at);
        Ok(products)
    }

    async fn set_stock(&self, id: ProductId, stock: i32) -> Result<StockChange> {
        check_stock(stock)?;
        let mut tables = self.tables.lock().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;

        let old_stock = product.stock;
        product.stock = stock;
        product.updated_at = Utc::now();

        Ok(StockChange {
            product_id: id,
            old_stock,
            new_stock: stock,
            updated_at: product.updated_at,
        })
    }
}
