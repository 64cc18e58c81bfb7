//! User endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::UserId;
use serde::{Deserialize, Serialize};
use storage::{Catalog, NewUser, User};

use crate::error::ApiError;
use crate::{AppState, AppStore};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    /// Stored as given. Hashing belongs to whatever issues credentials.
    pub password_hash: String,
}

/// A user as returned to clients. The credential is never serialized.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

fn validate(req: &CreateUserRequest) -> Result<(), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    match req.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(ApiError::BadRequest("email is not valid".to_string())),
    }
    if req.password_hash.is_empty() {
        return Err(ApiError::BadRequest(
            "passwordHash must not be empty".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    UserId::parse(raw).map_err(|_| ApiError::BadRequest("Invalid user UUID format".to_string()))
}

/// POST /users — register a user.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(req) = body?;
    validate(&req)?;

    let user = state
        .catalog
        .create_user(NewUser {
            name: req.name,
            email: req.email,
            password_hash: req.password_hash,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /users — list all users.
pub async fn list<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.catalog.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// GET /users/{id} — fetch one user.
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id = parse_user_id(&id)?;
    state
        .catalog
        .get_user(user_id)
        .await?
        .map(|user| Json(user.into()))
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}
