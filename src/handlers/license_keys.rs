//! License key management and customer license lookup.

use axum::{
    Extension, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{Pagination, SCOPE_LICENSE_MANAGE};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::models::{License, LicenseKey};

use crate::middleware::BrandContext;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/license-keys", get(list_license_keys))
        .route("/license-keys/{id}", get(get_license_key))
        .route("/license-keys/{id}/cancel", post(cancel_license_key))
        .route("/customers/licenses", get(get_customer_licenses))
}

#[derive(Serialize)]
pub struct LicenseKeyListResponse {
    pub license_keys: Vec<LicenseKey>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// GET /api/v1/license-keys
pub async fn list_license_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<LicenseKeyListResponse>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    let (license_keys, total) = queries::list_license_keys(
        &conn,
        &ctx.scope(),
        pagination.limit(),
        pagination.offset(),
    )?;
    Ok(Json(LicenseKeyListResponse {
        license_keys,
        total,
        page: pagination.page.max(1),
        per_page: pagination.limit(),
    }))
}

#[derive(Serialize)]
pub struct LicenseKeyDetail {
    #[serde(flatten)]
    pub license_key: LicenseKey,
    /// Decrypted display value, for re-surfacing to the customer
    pub key: String,
    pub licenses: Vec<License>,
}

/// GET /api/v1/license-keys/{id}
///
/// Detail view including the decrypted key and the licenses under it.
pub async fn get_license_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Path(id): Path<String>,
) -> Result<Json<LicenseKeyDetail>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    let license_key = queries::get_license_key_by_id(&conn, &ctx.scope(), &id)?
        .ok_or_else(|| AppError::NotFound("License key not found".into()))?;
    let key = license_key.decrypt_key(&state.master_key)?;
    let licenses =
        queries::list_licenses_for_customer(&conn, &ctx.scope(), &license_key.customer_email)?;

    Ok(Json(LicenseKeyDetail {
        license_key,
        key,
        licenses,
    }))
}

/// POST /api/v1/license-keys/{id}/cancel
///
/// Terminal: a cancelled key stops validating immediately. Existing
/// activations are untouched; clients fall off at their next status poll.
pub async fn cancel_license_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Path(id): Path<String>,
) -> Result<Json<LicenseKey>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    let cancelled = queries::cancel_license_key(&conn, &ctx.scope(), &id)?;
    if !cancelled {
        // Either unknown within this tenant or already cancelled
        let existing = queries::get_license_key_by_id(&conn, &ctx.scope(), &id)?;
        return match existing {
            Some(_) => Err(AppError::Conflict("License key is already cancelled".into())),
            None => Err(AppError::NotFound("License key not found".into())),
        };
    }

    tracing::info!(license_key_id = %id, "License key cancelled");
    let key = queries::get_license_key_by_id(&conn, &ctx.scope(), &id)?
        .ok_or_else(|| AppError::NotFound("License key not found".into()))?;
    Ok(Json(key))
}

#[derive(Debug, Deserialize)]
pub struct CustomerLicensesQuery {
    pub customer_email: String,
}

#[derive(Serialize)]
pub struct CustomerLicensesResponse {
    pub customer_email: String,
    pub licenses: Vec<License>,
}

/// GET /api/v1/customers/licenses?customer_email=
pub async fn get_customer_licenses(
    State(state): State<AppState>,
    Extension(ctx): Extension<BrandContext>,
    Query(query): Query<CustomerLicensesQuery>,
) -> Result<Json<CustomerLicensesResponse>> {
    ctx.require_permissions(&[SCOPE_LICENSE_MANAGE])?;

    let conn = state.db.get()?;
    let licenses =
        queries::list_licenses_for_customer(&conn, &ctx.scope(), &query.customer_email)?;
    Ok(Json(CustomerLicensesResponse {
        customer_email: query.customer_email,
        licenses,
    }))
}
