//! API key authentication.
//!
//! Resolves the `X-API-Key` header to the owning brand and binds the
//! request to that tenant. Each failure condition maps to its own error
//! code so callers can tell a malformed credential from an expired one
//! from an inactive tenant.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::crypto::hash_secret;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::keygen;
use crate::models::{ApiKey, Brand};
use crate::tenancy::TenantScope;
use crate::util::extract_api_key;

/// The authenticated tenant for the current request.
///
/// Handlers read this from request extensions; every store call they make
/// goes through [`BrandContext::scope`].
#[derive(Clone)]
pub struct BrandContext {
    pub brand: Brand,
    pub api_key: ApiKey,
}

impl BrandContext {
    /// Tenant scope binding store queries to this brand.
    pub fn scope(&self) -> TenantScope {
        TenantScope::brand(&self.brand.id)
    }

    /// Authorization check. Authentication has already succeeded at this
    /// point; a missing scope is a distinct 403, not a 401.
    pub fn require_permissions(&self, required: &[&str]) -> Result<()> {
        if self.api_key.allows(required) {
            Ok(())
        } else {
            Err(AppError::InsufficientPermissions)
        }
    }
}

/// Validate the credential and resolve the acting brand.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<BrandContext> {
    let raw = extract_api_key(headers).ok_or(AppError::ApiKeyMissing)?;
    let prefix = keygen::extract_api_key_prefix(raw).ok_or(AppError::ApiKeyMalformed)?;

    let conn = state.db.get()?;

    // Indexed lookup by the non-secret prefix, then hash comparison.
    // Unknown prefix and hash mismatch share one code on purpose.
    let key = queries::get_api_key_by_prefix(&conn, prefix)?.ok_or(AppError::ApiKeyInvalid)?;
    if hash_secret(raw) != key.key_hash {
        return Err(AppError::ApiKeyInvalid);
    }

    if !key.is_valid(Utc::now().timestamp()) {
        return Err(AppError::ApiKeyNotUsable);
    }

    let brand = queries::get_brand_by_id(&conn, &key.brand_id)?.ok_or(AppError::BrandInactive)?;
    if !brand.is_active {
        return Err(AppError::BrandInactive);
    }

    // Best-effort last-use stamp off the request path; failure to record
    // it never fails the request.
    let pool = state.db.clone();
    let key_id = key.id.clone();
    tokio::spawn(async move {
        match pool.get() {
            Ok(conn) => {
                if let Err(e) = queries::touch_api_key_last_used(&conn, &key_id) {
                    tracing::debug!("Failed to record API key last use: {}", e);
                }
            }
            Err(e) => tracing::debug!("Failed to get db connection for last-use stamp: {}", e),
        }
    });

    Ok(BrandContext {
        brand,
        api_key: key,
    })
}

pub async fn api_key_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let ctx = authenticate(&state, request.headers())?;
    tracing::debug!(
        brand_id = %ctx.brand.id,
        key_prefix = %ctx.api_key.prefix,
        "Request authenticated"
    );
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}
