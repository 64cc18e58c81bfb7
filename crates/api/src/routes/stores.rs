//! Store endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{StoreId, UserId};
use serde::{Deserialize, Serialize};
use storage::{Catalog, NewStore, Store};

use super::users::parse_user_id;
use crate::error::ApiError;
use crate::{AppState, AppStore};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoreRequest {
    pub name: String,
    pub owner_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    pub id: StoreId,
    pub name: String,
    pub owner_id: UserId,
    pub created_at: String,
}

impl From<Store> for StoreResponse {
    fn from(store: Store) -> Self {
        Self {
            id: store.id,
            name: store.name,
            owner_id: store.owner_id,
            created_at: store.created_at.to_rfc3339(),
        }
    }
}

pub(crate) fn parse_store_id(raw: &str) -> Result<StoreId, ApiError> {
    StoreId::parse(raw).map_err(|_| ApiError::BadRequest("Invalid store UUID format".to_string()))
}

/// POST /stores — open a store for an existing user.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<CreateStoreRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StoreResponse>), ApiError> {
    let Json(req) = body?;
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let owner_id = parse_user_id(&req.owner_id)?;

    let store = state
        .catalog
        .create_store(NewStore {
            name: req.name,
            owner_id,
        })
        .await?;

    tracing::info!(store_id = %store.id, %owner_id, "store created");
    Ok((StatusCode::CREATED, Json(store.into())))
}

/// GET /stores — list all stores.
pub async fn list<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<StoreResponse>>, ApiError> {
    let stores = state.catalog.list_stores().await?;
    Ok(Json(stores.into_iter().map(StoreResponse::from).collect()))
}

/// GET /stores/{id} — fetch one store.
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StoreResponse>, ApiError> {
    let store_id = parse_store_id(&id)?;
    state
        .catalog
        .get_store(store_id)
        .await?
        .map(|store| Json(store.into()))
        .ok_or_else(|| ApiError::NotFound("Store not found".to_string()))
}
