//! API key management endpoints.

use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    routing::{delete, post},
};

use super::SCOPE_API_KEYS_MANAGE;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::BrandContext;
use crate::models::{ApiKey, ApiKeyCreated, CreateApiKey};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api-keys", post(create_api_key).get(list_api_keys))
        .route("/api-keys/{id}/rotate", post(rotate_api_key))
        .route("/api-keys/{id}", delete(revoke_api_key))
}

/// POST /api/v1/api-keys
///
/// The plaintext credential appears in the response exactly once.
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Json(body): Json<CreateApiKey>,
) -> Result<(StatusCode, Json<ApiKeyCreated>)> {
    ctx.require_permissions(&[SCOPE_API_KEYS_MANAGE])?;

    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("API key name must not be empty".into()));
    }

    let conn = state.db.get()?;
    let (key, plaintext) = queries::create_api_key(&conn, &ctx.brand.id, &body)?;
    tracing::info!(brand_id = %ctx.brand.id, key_id = %key.id, "API key created");

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyCreated {
            id: key.id,
            name: key.name,
            key: plaintext,
            prefix: key.prefix,
            permissions: key.permissions,
            created_at: key.created_at,
            expires_at: key.expires_at,
        }),
    ))
}

/// GET /api/v1/api-keys
pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
) -> Result<Json<Vec<ApiKey>>> {
    ctx.require_permissions(&[SCOPE_API_KEYS_MANAGE])?;

    let conn = state.db.get()?;
    let keys = queries::list_api_keys(&conn, &ctx.scope())?;
    Ok(Json(keys))
}

/// POST /api/v1/api-keys/{id}/rotate
///
/// Replaces prefix and secret in place; the old credential stops working
/// immediately and the new plaintext is shown exactly once.
pub async fn rotate_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiKeyCreated>> {
    ctx.require_permissions(&[SCOPE_API_KEYS_MANAGE])?;

    let conn = state.db.get()?;
    let (key, plaintext) = queries::rotate_api_key(&conn, &ctx.scope(), &id)?
        .ok_or_else(|| AppError::NotFound("API key not found".into()))?;
    tracing::info!(brand_id = %ctx.brand.id, key_id = %key.id, "API key rotated");

    Ok(Json(ApiKeyCreated {
        id: key.id,
        name: key.name,
        key: plaintext,
        prefix: key.prefix,
        permissions: key.permissions,
        created_at: key.created_at,
        expires_at: key.expires_at,
    }))
}

/// DELETE /api/v1/api-keys/{id}
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    ctx.require_permissions(&[SCOPE_API_KEYS_MANAGE])?;

    let conn = state.db.get()?;
    let revoked = queries::revoke_api_key(&conn, &ctx.scope(), &id)?;
    if !revoked {
        return Err(AppError::NotFound("API key not found".into()));
    }
    tracing::info!(brand_id = %ctx.brand.id, key_id = %id, "API key revoked");
    Ok(StatusCode::NO_CONTENT)
}
