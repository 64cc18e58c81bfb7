use std::sync::atomic::{AtomicU64, Ordering};

use checkout::{
    CheckoutConfig, CheckoutOrchestrator, CheckoutRequest, IdempotencyToken, Quantity,
};
use criterion::{Criterion, criterion_group, criterion_main};
use rust_decimal::Decimal;
use storage::{Catalog, InMemoryStore, NewProduct, NewStore, NewUser};

fn setup(rt: &tokio::runtime::Runtime) -> (CheckoutOrchestrator<InMemoryStore>, CheckoutRequest) {
    rt.block_on(async {
        let store = InMemoryStore::new();
        let user = store
            .create_user(NewUser {
                name: "Bench".to_string(),
                email: "bench@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let shop = store
            .create_store(NewStore {
                name: "Bench Store".to_string(),
                owner_id: user.id,
            })
            .await
            .unwrap();
        let product = store
            .create_product(NewProduct {
                store_id: shop.id,
                name: "Bench Widget".to_string(),
                price: Decimal::new(1999, 2),
                stock: i32::MAX,
            })
            .await
            .unwrap();

        let request = CheckoutRequest::new(
            user.id,
            product.id,
            Quantity::new(1).unwrap(),
            Some(IdempotencyToken::parse("bench-replay").unwrap()),
        );
        let orchestrator = CheckoutOrchestrator::new(store, CheckoutConfig::default());
        (orchestrator, request)
    })
}

fn bench_fresh_checkout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (orchestrator, template) = setup(&rt);
    let counter = AtomicU64::new(0);

    c.bench_function("checkout/fresh_order", |b| {
        b.iter(|| {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            let mut request = template.clone();
            request.token = Some(IdempotencyToken::parse(&format!("bench-{n}")).unwrap());
            rt.block_on(async { orchestrator.checkout(request).await.unwrap() });
        });
    });
}

fn bench_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (orchestrator, request) = setup(&rt);
    rt.block_on(async { orchestrator.checkout(request.clone()).await.unwrap() });

    c.bench_function("checkout/replay", |b| {
        b.iter(|| {
            rt.block_on(async { orchestrator.checkout(request.clone()).await.unwrap() });
        });
    });
}

criterion_group!(benches, bench_fresh_checkout, bench_replay);
criterion_main!(benches);
