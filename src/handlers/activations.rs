//! Activation endpoints: the boundary over the activation engine.

use axum::{
    Extension, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{delete, post},
};
use serde::Deserialize;

use super::SCOPE_LICENSE_ACTIVATE;
use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::licensing::{self, StatusResult};
use crate::middleware::BrandContext;
use crate::models::{ActivateRequest, Activation};
use crate::util::extract_client_info;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/activations", post(activate))
        .route("/activations/check", post(check_status))
        .route("/activations/{id}", delete(deactivate))
}

/// POST /api/v1/activations
///
/// Grant a seat for one instance. Re-activating an already-active instance
/// returns the existing activation unchanged (200, not an error).
pub async fn activate(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    headers: HeaderMap,
    Json(body): Json<ActivateRequest>,
) -> Result<Json<Activation>> {
    ctx.require_permissions(&[SCOPE_LICENSE_ACTIVATE])?;

    let mut conn = state.db.get()?;
    let client = extract_client_info(&headers);
    let activation = licensing::activate(
        &mut conn,
        &state.master_key,
        &state.events,
        &ctx.scope(),
        &body,
        &client,
    )?;
    Ok(Json(activation))
}

/// DELETE /api/v1/activations/{id}
pub async fn deactivate(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    ctx.require_permissions(&[SCOPE_LICENSE_ACTIVATE])?;

    let mut conn = state.db.get()?;
    let client = extract_client_info(&headers);
    licensing::deactivate(&mut conn, &state.events, &ctx.scope(), &id, &client)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CheckStatusRequest {
    pub license_key: String,
    pub product_slug: String,
}

/// POST /api/v1/activations/check
///
/// Polling-style status check: always 200 with a structured result; an
/// unknown or expired key is data, not an error.
pub async fn check_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Json(body): Json<CheckStatusRequest>,
) -> Result<Json<StatusResult>> {
    ctx.require_permissions(&[SCOPE_LICENSE_ACTIVATE])?;

    let conn = state.db.get()?;
    let status = licensing::check_status(&conn, &ctx.scope(), &body.license_key, &body.product_slug)?;
    Ok(Json(status))
}
