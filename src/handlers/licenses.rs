//! License provisioning and lifecycle endpoints.

use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{Pagination, SCOPE_LICENSE_MANAGE};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::licensing::{self, ProvisionedLicense};
use crate::middleware::BrandContext;
use crate::models::{Activation, CreateLicense, License};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/licenses", post(create_license).get(list_licenses))
        .route("/licenses/{id}", get(get_license))
        .route("/licenses/{id}/activations", get(list_license_activations))
        .route("/licenses/{id}/suspend", post(suspend_license))
        .route("/licenses/{id}/resume", post(resume_license))
        .route("/licenses/{id}/renew", post(renew_license))
        .route("/licenses/{id}/cancel", post(cancel_license))
}

/// POST /api/v1/licenses
///
/// Provision a license. The customer's existing active license key is
/// reused; when a new key is minted its plaintext appears in the response
/// exactly once.
pub async fn create_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Json(body): Json<CreateLicense>,
) -> Result<(StatusCode, Json<ProvisionedLicense>)> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let mut conn = state.db.get()?;
    let provisioned = licensing::provision_license(
        &mut conn,
        &state.master_key,
        &state.events,
        &ctx.brand.id,
        &body,
    )?;
    Ok((StatusCode::CREATED, Json(provisioned)))
}

#[derive(Serialize)]
pub struct LicenseListResponse {
    pub licenses: Vec<License>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// GET /api/v1/licenses
pub async fn list_licenses(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<LicenseListResponse>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    let (licenses, total) = queries::list_licenses(
        &conn,
        &ctx.scope(),
        pagination.limit(),
        pagination.offset(),
    )?;
    Ok(Json(LicenseListResponse {
        licenses,
        total,
        page: pagination.page.max(1),
        per_page: pagination.limit(),
    }))
}

/// GET /api/v1/licenses/{id}
pub async fn get_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Path(id): Path<String>,
) -> Result<Json<License>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    let license = queries::get_license_by_id(&conn, &ctx.scope(), &id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    Ok(Json(license))
}

/// GET /api/v1/licenses/{id}/activations
pub async fn list_license_activations(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Activation>>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    // 404 when the license itself is outside the caller's tenant
    queries::get_license_by_id(&conn, &ctx.scope(), &id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    let activations = queries::list_activations_for_license(&conn, &ctx.scope(), &id)?;
    Ok(Json(activations))
}

/// POST /api/v1/licenses/{id}/suspend
pub async fn suspend_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Path(id): Path<String>,
) -> Result<Json<License>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    let license = licensing::suspend_license(&conn, &state.events, &ctx.scope(), &id)?;
    Ok(Json(license))
}

/// POST /api/v1/licenses/{id}/resume
pub async fn resume_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Path(id): Path<String>,
) -> Result<Json<License>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    let license = licensing::resume_license(&conn, &state.events, &ctx.scope(), &id)?;
    Ok(Json(license))
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    /// Days to extend from now
    pub days: i64,
}

/// POST /api/v1/licenses/{id}/renew
pub async fn renew_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Path(id): Path<String>,
    Json(body): Json<RenewRequest>,
) -> Result<Json<License>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    let license = licensing::renew_license(&conn, &state.events, &ctx.scope(), &id, body.days)?;
    Ok(Json(license))
}

/// POST /api/v1/licenses/{id}/cancel
pub async fn cancel_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Path(id): Path<String>,
) -> Result<Json<License>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    let license = licensing::cancel_license(&conn, &state.events, &ctx.scope(), &id)?;
    Ok(Json(license))
}
