//! Checkout against a real PostgreSQL instance.
//!
//! Exercises the row lock and the idempotency key constraint under real
//! concurrency. Run with:
//!
//! ```bash
//! cargo test -p checkout --test postgres_checkout
//! ```

use std::sync::Arc;

use checkout::{
    CheckoutConfig, CheckoutError, CheckoutOrchestrator, CheckoutRequest, IdempotencyToken,
    Quantity,
};
use common::{ProductId, UserId};
use rust_decimal::Decimal;
use serial_test::serial;
use sqlx::PgPool;
use storage::{Catalog, NewProduct, NewStore, NewUser, PostgresStore};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

struct Fixture {
    orchestrator: Arc<CheckoutOrchestrator<PostgresStore>>,
    store: PostgresStore,
    user_id: UserId,
    product_id: ProductId,
}

impl Fixture {
    async fn new(stock: i32) -> Self {
        Self::with_price(stock, Decimal::new(1999, 2)).await
    }

    async fn with_price(stock: i32, price: Decimal) -> Self {
        let info = get_container_info().await;
        let store = PostgresStore::connect(&info.connection_string, 20)
            .await
            .unwrap();

        sqlx::query("TRUNCATE TABLE orders, idempotency_keys, products, stores, users")
            .execute(store.pool())
            .await
            .unwrap();

        let user = store
            .create_user(NewUser {
                name: "Buyer".to_string(),
                email: "buyer@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let shop = store
            .create_store(NewStore {
                name: "Merch Drop".to_string(),
                owner_id: user.id,
            })
            .await
            .unwrap();
        let product = store
            .create_product(NewProduct {
                store_id: shop.id,
                name: "Signed poster".to_string(),
                price,
                stock,
            })
            .await
            .unwrap();

        Self {
            orchestrator: Arc::new(CheckoutOrchestrator::new(
                store.clone(),
                CheckoutConfig::default(),
            )),
            store,
            user_id: user.id,
            product_id: product.id,
        }
    }

    fn request(&self, quantity: i64, token: &str) -> CheckoutRequest {
        CheckoutRequest::new(
            self.user_id,
            self.product_id,
            Quantity::new(quantity).unwrap(),
            Some(IdempotencyToken::parse(token).unwrap()),
        )
    }

    async fn stock(&self) -> i32 {
        self.store
            .get_product(self.product_id)
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    async fn order_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(self.store.pool())
            .await
            .unwrap()
    }
}

#[tokio::test]
#[serial]
async fn concurrent_checkouts_sell_exactly_the_stock() {
    let f = Fixture::new(10).await;

    let mut handles = Vec::new();
    for i in 0..30 {
        let orchestrator = f.orchestrator.clone();
        let request = f.request(1, &format!("pg-attempt-{i}"));
        handles.push(tokio::spawn(async move {
            orchestrator.checkout(request).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                assert!(!outcome.is_duplicate());
                created += 1;
            }
            Err(CheckoutError::InsufficientStock { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(created, 10);
    assert_eq!(f.stock().await, 0);
    assert_eq!(f.order_count().await, 10);
}

#[tokio::test]
#[serial]
async fn concurrent_requests_with_one_token_create_one_order() {
    let f = Fixture::new(10).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let orchestrator = f.orchestrator.clone();
        let request = f.request(2, "pg-shared-token");
        handles.push(tokio::spawn(async move {
            orchestrator.checkout(request).await
        }));
    }

    let mut order_ids = Vec::new();
    let mut created = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if !outcome.is_duplicate() {
            created += 1;
        }
        order_ids.push(outcome.order_id());
    }

    assert_eq!(created, 1);
    order_ids.dedup();
    assert_eq!(order_ids.len(), 1);
    assert_eq!(f.stock().await, 8);
    assert_eq!(f.order_count().await, 1);
}

#[tokio::test]
#[serial]
async fn two_requests_for_three_of_five() {
    let f = Fixture::new(5).await;

    let a = {
        let orchestrator = f.orchestrator.clone();
        let request = f.request(3, "pg-a");
        tokio::spawn(async move { orchestrator.checkout(request).await })
    };
    let b = {
        let orchestrator = f.orchestrator.clone();
        let request = f.request(3, "pg-b");
        tokio::spawn(async move { orchestrator.checkout(request).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(CheckoutError::InsufficientStock { .. })))
    );
    assert_eq!(f.stock().await, 2);
}

#[tokio::test]
#[serial]
async fn sequential_replays_decrement_once() {
    let f = Fixture::new(10).await;

    let first = f
        .orchestrator
        .checkout(f.request(2, "pg-retry"))
        .await
        .unwrap();
    assert!(!first.is_duplicate());
    assert_eq!(first.order().total_price, Decimal::new(3998, 2));

    for _ in 0..2 {
        let replay = f
            .orchestrator
            .checkout(f.request(2, "pg-retry"))
            .await
            .unwrap();
        assert!(replay.is_duplicate());
        assert_eq!(replay.order_id(), first.order_id());
    }

    assert_eq!(f.stock().await, 8);
    assert_eq!(f.order_count().await, 1);
}

#[tokio::test]
#[serial]
async fn insufficient_stock_rolls_back_the_key() {
    let f = Fixture::new(1).await;

    let err = f
        .orchestrator
        .checkout(f.request(2, "pg-short"))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InsufficientStock { .. }));

    let keys: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM idempotency_keys")
        .fetch_one(f.store.pool())
        .await
        .unwrap();
    assert_eq!(keys, 0);
    assert_eq!(f.stock().await, 1);
}

#[tokio::test]
#[serial]
async fn total_beyond_money_limit_is_a_validation_error() {
    let f = Fixture::with_price(5, storage::MAX_MONEY).await;

    let err = f
        .orchestrator
        .checkout(f.request(2, "pg-too-expensive"))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)), "{err:?}");
    assert!(!err.is_retryable());

    assert_eq!(f.stock().await, 5);
    assert_eq!(f.order_count().await, 0);

    let outcome = f
        .orchestrator
        .checkout(f.request(1, "pg-at-the-limit"))
        .await
        .unwrap();
    assert_eq!(outcome.order().total_price, storage::MAX_MONEY);
}
