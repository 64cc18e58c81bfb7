//! HTTP API server with observability for the checkout service.
//!
//! Provides REST endpoints for the catalog and for exactly-once checkout,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use checkout::{CheckoutConfig, CheckoutOrchestrator};
use metrics_exporter_prometheus::PrometheusHandle;
use storage::{Catalog, CheckoutStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// A store that can back the whole API.
pub trait AppStore: CheckoutStore + Catalog + Clone + 'static {}

impl<S: CheckoutStore + Catalog + Clone + 'static> AppStore for S {}

/// Shared application state accessible from all handlers.
pub struct AppState<S: AppStore> {
    pub catalog: S,
    pub orchestrator: CheckoutOrchestrator<S>,
}

/// Creates the application state around a single store.
pub fn create_state<S: AppStore>(store: S, config: CheckoutConfig) -> Arc<AppState<S>> {
    Arc::new(AppState {
        catalog: store.clone(),
        orchestrator: CheckoutOrchestrator::new(store, config),
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: AppStore>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/users",
            post(routes::users::create::<S>).get(routes::users::list::<S>),
        )
        .route("/users/{id}", get(routes::users::get::<S>))
        .route(
            "/stores",
            post(routes::stores::create::<S>).get(routes::stores::list::<S>),
        )
        .route("/stores/{id}", get(routes::stores::get::<S>))
        .route(
            "/products",
            post(routes::products::create::<S>).get(routes::products::list::<S>),
        )
        .route("/products/{id}", get(routes::products::get::<S>))
        .route(
            "/products/{id}/stock",
            patch(routes::products::update_stock::<S>),
        )
        .route("/checkout", post(routes::checkout::checkout::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
