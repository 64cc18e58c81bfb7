use std::time::Duration;

use async_trait::async_trait;
use common::{IdempotencyKeyId, OrderId, ProductId, StoreId, UserId};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    KeyRecord, NewOrder, NewProduct, NewStore, NewUser, Order, Product, Result, StockChange,
    StockDecrement, Store, StoreError, User,
    store::{Catalog, CheckoutStore, IdempotencyRegistry, InventoryStore, OrderLedger, UnitOfWork},
};

const IDEMPOTENCY_KEY_CONSTRAINT: &str = "uq_idempotency_keys_key";

const PRODUCT_COLUMNS: &str = "id, store_id, name, price, stock, created_at, updated_at";
const ORDER_COLUMNS: &str =
    "id, user_id, product_id, store_id, quantity, total_price, idempotency_key_id, created_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool with at most `max_connections` connections.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";
const CHECK_VIOLATION: &str = "23514";

/// Translates constraint violations into their store-level meaning.
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        let constraint = db_err.constraint().unwrap_or("unknown").to_string();
        if db_err.is_unique_violation() {
            return StoreError::Conflict(constraint);
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::InvalidReference(constraint);
        }
        match db_err.code().as_deref() {
            Some(CHECK_VIOLATION) => return StoreError::InvalidValue(constraint),
            Some(NUMERIC_VALUE_OUT_OF_RANGE) => {
                return StoreError::InvalidValue(db_err.message().to_string());
            }
            _ => {}
        }
    }
    StoreError::Database(err)
}

fn row_to_user(row: PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_store(row: PgRow) -> Result<Store> {
    Ok(Store {
        id: StoreId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        owner_id: UserId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        stock: row.try_get("stock")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_key(row: PgRow) -> Result<KeyRecord> {
    Ok(KeyRecord {
        id: IdempotencyKeyId::from_uuid(row.try_get::<Uuid, _>("id")?),
        key: row.try_get("key")?,
        purpose: row.try_get("used_for")?,
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
        quantity: row.try_get("quantity")?,
        total_price: row.try_get("total_price")?,
        idempotency_key_id: IdempotencyKeyId::from_uuid(
            row.try_get::<Uuid, _>("idempotency_key_id")?,
        ),
        created_at: row.try_get("created_at")?,
    })
}

/// A unit of work backed by a PostgreSQL transaction.
///
/// Runs at the default READ COMMITTED level. Stock safety comes from the
/// row lock taken by the conditional `UPDATE`, and key uniqueness from the
/// `uq_idempotency_keys_key` constraint.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CheckoutStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

#[async_trait]
impl InventoryStore for PgUnitOfWork {
    async fn get_product(&mut self, id: ProductId) -> Result<Product> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::not_found("Product", id))?;

        row_to_product(row)
    }

    async fn conditional_decrement(
        &mut self,
        id: ProductId,
        quantity: i32,
    ) -> Result<StockDecrement> {
        // Check and mutation are one statement. Concurrent decrements on the
        // same row wait for the lock and re-evaluate the predicate.
        let row: Option<PgRow> = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING store_id, stock, price
            "#,
        )
        .bind(id.as_uuid())
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = row {
            return Ok(StockDecrement {
                product_id: id,
                store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
                remaining: row.try_get("stock")?,
                unit_price: row.try_get("price")?,
            });
        }

        let available: Option<i32> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match available {
            Some(available) => Err(StoreError::InsufficientStock {
                product_id: id,
                requested: quantity,
                available,
            }),
            None => Err(StoreError::not_found("Product", id)),
        }
    }
}

#[async_trait]
impl IdempotencyRegistry for PgUnitOfWork {
    async fn find_by_key(&mut self, key: &str) -> Result<Option<KeyRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, key, used_for, user_id, created_at
            FROM idempotency_keys
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_key).transpose()
    }

    async fn insert_key(&mut self, key: &str, purpose: &str, user_id: UserId) -> Result<KeyRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (id, key, used_for, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, key, used_for, user_id, created_at
            "#,
        )
        .bind(IdempotencyKeyId::new().as_uuid())
        .bind(key)
        .bind(purpose)
        .bind(user_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match map_write_error(e) {
            StoreError::Conflict(constraint) if constraint == IDEMPOTENCY_KEY_CONSTRAINT => {
                StoreError::DuplicateKey(key.to_string())
            }
            other => other,
        })?;

        row_to_key(row)
    }

    async fn find_order_by_key_id(&mut self, key_id: IdempotencyKeyId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE idempotency_key_id = $1"
        ))
        .bind(key_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_order).transpose()
    }
}

#[async_trait]
impl OrderLedger for PgUnitOfWork {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (id, user_id, product_id, store_id, quantity, total_price, idempotency_key_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(OrderId::new().as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.product_id.as_uuid())
        .bind(order.store_id.as_uuid())
        .bind(order.quantity)
        .bind(order.total_price)
        .bind(order.idempotency_key_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        row_to_order(row)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn user_exists(&mut self, id: UserId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for PostgresStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, password_hash, created_at
            "#,
        )
        .bind(UserId::new().as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        row_to_user(row)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row: Option<PgRow> = sqlx::query(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_user).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, name, email, password_hash, created_at FROM users ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_user).collect()
    }

    async fn create_store(&self, store: NewStore) -> Result<Store> {
        let row = sqlx::query(
            r#"
            INSERT INTO stores (id, name, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(StoreId::new().as_uuid())
        .bind(&store.name)
        .bind(store.owner_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        row_to_store(row)
    }

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>> {
        let row: Option<PgRow> =
            sqlx::query("SELECT id, name, owner_id, created_at FROM stores WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_store).transpose()
    }

    async fn list_stores(&self) -> Result<Vec<Store>> {
        let rows =
            sqlx::query("SELECT id, name, owner_id, created_at FROM stores ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(row_to_store).collect()
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (id, store_id, name, price, stock)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(ProductId::new().as_uuid())
        .bind(product.store_id.as_uuid())
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        row_to_product(row)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_product).collect()
    }

    async fn set_stock(&self, id: ProductId, stock: i32) -> Result<StockChange> {
        let mut tx = self.pool.begin().await?;

        let old_stock: i32 =
            sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::not_found("Product", id))?;

        let row = sqlx::query(
            r#"
            UPDATE products
            SET stock = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING stock, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(stock)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        let change = StockChange {
            product_id: id,
            old_stock,
            new_stock: row.try_get("stock")?,
            updated_at: row.try_get("updated_at")?,
        };

        tx.commit().await?;
        tracing::info!(product_id = %id, old_stock, new_stock = stock, "stock set");
        Ok(change)
    }
}
