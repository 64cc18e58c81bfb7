//! Checkout orchestrator for exactly-once order creation.

use std::time::{Duration, Instant};

use chrono::Utc;
use storage::{CheckoutStore, NewOrder, Order, PURPOSE_ORDER, StoreError, UnitOfWork};

use crate::config::CheckoutConfig;
use crate::error::CheckoutError;
use crate::outcome::CheckoutOutcome;
use crate::pricing::order_total;
use crate::request::CheckoutRequest;
use crate::token::{IdempotencyToken, derive_legacy_key};

/// Coordinates the idempotency registry, inventory and order ledger.
///
/// Holds no mutable state of its own. Every checkout runs in a fresh unit
/// of work from the store, so any number of orchestrators (in one process or
/// many) can serve the same products concurrently.
pub struct CheckoutOrchestrator<S: CheckoutStore> {
    store: S,
    config: CheckoutConfig,
}

impl<S: CheckoutStore> CheckoutOrchestrator<S> {
    /// Creates a new orchestrator.
    pub fn new(store: S, config: CheckoutConfig) -> Self {
        Self { store, config }
    }

    /// Gets a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Runs a checkout under the configured deadline.
    pub async fn checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        self.checkout_with_deadline(request, self.config.timeout)
            .await
    }

    /// Runs a checkout whose work up to the commit must finish within `deadline`.
    ///
    /// On expiry the in-flight unit of work is dropped, which rolls it back.
    /// The commit itself is not cut short: once issued, its result is
    /// reported as is, and a failed commit surfaces as `CommitFailure`.
    #[tracing::instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            product_id = %request.product_id,
            quantity = request.quantity.get(),
        )
    )]
    pub async fn checkout_with_deadline(
        &self,
        request: CheckoutRequest,
        deadline: Duration,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let started = Instant::now();

        let result = match self.resolve_key(&request) {
            Ok(key) => self.execute(&request, &key, deadline).await,
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(outcome) => outcome.kind(),
            Err(e) => e.kind(),
        };
        metrics::counter!("checkout_requests_total", "outcome" => outcome).increment(1);
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(done) => tracing::info!(order_id = %done.order_id(), outcome, "checkout finished"),
            Err(e) if e.is_retryable() => tracing::error!(error = %e, outcome, "checkout failed"),
            Err(e) => tracing::info!(reason = %e, outcome, "checkout rejected"),
        }

        result
    }

    fn resolve_key(&self, request: &CheckoutRequest) -> Result<IdempotencyToken, CheckoutError> {
        match &request.token {
            Some(token) => Ok(token.clone()),
            None if self.config.require_client_key => Err(CheckoutError::Validation(
                "an idempotency key is required".to_string(),
            )),
            None => {
                let key = derive_legacy_key(
                    request.user_id,
                    request.product_id,
                    request.quantity.get(),
                    Utc::now(),
                );
                tracing::warn!(%key, "no idempotency key supplied, using time-bucketed key");
                Ok(key)
            }
        }
    }

    async fn execute(
        &self,
        request: &CheckoutRequest,
        key: &IdempotencyToken,
        deadline: Duration,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let staged = match tokio::time::timeout(deadline, self.stage(request, key)).await {
            Ok(staged) => staged?,
            Err(_) => return Err(CheckoutError::Timeout(deadline)),
        };

        match staged {
            Staged::Replay(order) => Ok(CheckoutOutcome::Duplicate(order)),
            Staged::Pending {
                uow,
                order,
                remaining_stock,
            } => {
                uow.commit().await.map_err(CheckoutError::CommitFailure)?;

                tracing::info!(
                    order_id = %order.id,
                    remaining_stock,
                    total_price = %order.total_price,
                    "order created"
                );
                Ok(CheckoutOutcome::Created(order))
            }
        }
    }

    /// Re-runs the unit of work when a concurrent attempt wins the key insert.
    async fn stage(
        &self,
        request: &CheckoutRequest,
        key: &IdempotencyToken,
    ) -> Result<Staged, CheckoutError> {
        let mut conflicts = 0;
        loop {
            if let Some(staged) = self.attempt(request, key).await? {
                return Ok(staged);
            }

            metrics::counter!("checkout_key_conflicts_total").increment(1);
            conflicts += 1;
            if conflicts > self.config.max_key_conflict_retries {
                return Err(CheckoutError::TransactionFailure(StoreError::DuplicateKey(
                    key.to_string(),
                )));
            }
            tracing::debug!(%key, conflicts, "lost idempotency key race, re-reading");
        }
    }

    /// One unit of work, left uncommitted. `Ok(None)` means the key insert
    /// lost a race and everything was rolled back.
    async fn attempt(
        &self,
        request: &CheckoutRequest,
        key: &IdempotencyToken,
    ) -> Result<Option<Staged>, CheckoutError> {
        let mut uow = self.store.begin().await?;

        // 1. Look up or register the key
        let existing = uow.find_by_key(key.as_str()).await?;
        let key_id = match existing {
            Some(record) => {
                if record.user_id != request.user_id {
                    return Err(CheckoutError::IdempotencyMismatch {
                        key: key.to_string(),
                    });
                }

                let linked = uow.find_order_by_key_id(record.id).await?;
                if let Some(order) = linked {
                    ensure_same_purchase(&order, request, key)?;
                    discard(uow).await;
                    tracing::info!(order_id = %order.id, "replaying order for known idempotency key");
                    return Ok(Some(Staged::Replay(order)));
                }

                tracing::info!(key_id = %record.id, "reusing idempotency key without an order");
                record.id
            }
            None => {
                if !uow.user_exists(request.user_id).await? {
                    return Err(CheckoutError::NotFound {
                        entity: "User",
                        id: request.user_id.to_string(),
                    });
                }

                let inserted = uow
                    .insert_key(key.as_str(), PURPOSE_ORDER, request.user_id)
                    .await;
                match inserted {
                    Ok(record) => record.id,
                    Err(StoreError::DuplicateKey(_)) => {
                        discard(uow).await;
                        return Ok(None);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        // 2. Conditional decrement
        let decrement = uow
            .conditional_decrement(request.product_id, request.quantity.get())
            .await?;

        // 3. Price from the locked row
        let total_price = order_total(decrement.unit_price, request.quantity)?;

        // 4. Ledger insert
        let order = uow
            .insert_order(NewOrder {
                user_id: request.user_id,
                product_id: request.product_id,
                store_id: decrement.store_id,
                quantity: request.quantity.get(),
                total_price,
                idempotency_key_id: key_id,
            })
            .await?;

        Ok(Some(Staged::Pending {
            uow,
            order,
            remaining_stock: decrement.remaining,
        }))
    }
}

/// Where an attempt stands once everything but the commit is done.
enum Staged {
    /// The key already produced this order. Nothing to commit.
    Replay(Order),
    /// Key, decrement and order are written but not yet visible.
    Pending {
        uow: Box<dyn UnitOfWork>,
        order: Order,
        remaining_stock: i32,
    },
}

/// A replayed order must match the request that now carries its token.
fn ensure_same_purchase(
    order: &Order,
    request: &CheckoutRequest,
    key: &IdempotencyToken,
) -> Result<(), CheckoutError> {
    if order.product_id != request.product_id || order.quantity != request.quantity.get() {
        return Err(CheckoutError::IdempotencyMismatch {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Rolls back a unit of work whose outcome is already decided.
async fn discard(uow: Box<dyn UnitOfWork>) {
    if let Err(e) = uow.rollback().await {
        tracing::warn!(error = %e, "rollback failed, connection will be reset");
    }
}
