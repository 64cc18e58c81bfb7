//! Product endpoints, including administrative restocking.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ProductId, StoreId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use storage::{Catalog, MAX_MONEY, NewProduct, Product, StockChange};

use super::stores::parse_store_id;
use crate::error::ApiError;
use crate::{AppState, AppStore};

/// Prices are stored with two fractional digits.
const PRICE_SCALE: u32 = 2;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub store_id: String,
    pub name: String,
    /// Accepts a JSON number or a decimal string.
    pub price: Decimal,
    pub stock: i64,
}

#[derive(Deserialize)]
pub struct UpdateStockRequest {
    pub stock: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: ProductId,
    pub store_id: StoreId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub stock: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            store_id: product.store_id,
            name: product.name,
            price: product.price,
            stock: product.stock,
            created_at: product.created_at.to_rfc3339(),
            updated_at: product.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChangeResponse {
    pub product_id: ProductId,
    pub old_stock: i32,
    pub new_stock: i32,
    pub updated_at: String,
}

impl From<StockChange> for StockChangeResponse {
    fn from(change: StockChange) -> Self {
        Self {
            product_id: change.product_id,
            old_stock: change.old_stock,
            new_stock: change.new_stock,
            updated_at: change.updated_at.to_rfc3339(),
        }
    }
}

fn parse_product_id(raw: &str) -> Result<ProductId, ApiError> {
    ProductId::parse(raw)
        .map_err(|_| ApiError::BadRequest("Invalid product UUID format".to_string()))
}

fn validate_price(price: Decimal) -> Result<Decimal, ApiError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ApiError::BadRequest("price must not be negative".to_string()));
    }
    if price > MAX_MONEY {
        return Err(ApiError::BadRequest(format!(
            "price must not exceed {MAX_MONEY}"
        )));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(ApiError::BadRequest(format!(
            "price must have at most {PRICE_SCALE} decimal places"
        )));
    }
    Ok(price)
}

fn validate_stock(stock: i64) -> Result<i32, ApiError> {
    if stock < 0 {
        return Err(ApiError::BadRequest("stock must not be negative".to_string()));
    }
    i32::try_from(stock).map_err(|_| ApiError::BadRequest("stock is too large".to_string()))
}

/// POST /products — list a product in a store.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let Json(req) = body?;
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let store_id = parse_store_id(&req.store_id)?;
    let price = validate_price(req.price)?;
    let stock = validate_stock(req.stock)?;

    let product = state
        .catalog
        .create_product(NewProduct {
            store_id,
            name: req.name,
            price,
            stock,
        })
        .await?;

    tracing::info!(product_id = %product.id, %store_id, stock, "product created");
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// GET /products — list all products.
pub async fn list<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.catalog.list_products().await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

/// GET /products/{id} — fetch one product with its current stock.
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    state
        .catalog
        .get_product(product_id)
        .await?
        .map(|product| Json(product.into()))
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))
}

/// PATCH /products/{id}/stock — overwrite stock with an absolute value.
#[tracing::instrument(skip(state, body))]
pub async fn update_stock<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateStockRequest>, JsonRejection>,
) -> Result<Json<StockChangeResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let Json(req) = body?;
    let stock = validate_stock(req.stock)?;

    let change = state.catalog.set_stock(product_id, stock).await?;
    Ok(Json(change.into()))
}
