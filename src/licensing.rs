//! License entitlement and activation engine.
//!
//! The use cases here sit between the HTTP boundary and the repository
//! layer: they resolve credentials, walk the license lifecycle state
//! machine, enforce per-instance-type seat limits, and publish domain
//! events. Failure ordering is deliberate - credential validity before
//! entitlement resolution, entitlement before capacity - so callers always
//! receive the most specific applicable error.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use crate::crypto::{MasterKey, hash_secret};
use crate::db::queries::{self, ActivationOutcome};
use crate::error::{AppError, Result};
use crate::events::EventSink;
use crate::models::*;
use crate::tenancy::TenantScope;

/// Client request context attached to activation rows and domain events.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Resolve a raw license key credential to a usable key and the license for
/// the requested product. Shared by activate and check_status.
fn resolve_entitlement(
    conn: &Connection,
    scope: &TenantScope,
    license_key: &str,
    product_slug: &str,
    now: i64,
) -> Result<(LicenseKey, License)> {
    let key_hash = hash_secret(license_key);
    let key = queries::find_license_key_by_hash(conn, scope, &key_hash)?
        .ok_or(AppError::LicenseKeyInvalid)?;

    if !key.is_valid(now) {
        return Err(AppError::LicenseKeyNotUsable);
    }

    let license = queries::find_license_for_product(conn, scope, &key.id, product_slug)?
        .ok_or_else(|| AppError::LicenseNotFoundForProduct(product_slug.to_string()))?;

    Ok((key, license))
}

fn cannot_activate_reason(license: &License, now: i64) -> &'static str {
    if license.is_expired(now) {
        "expired"
    } else {
        license.status.as_str()
    }
}

/// Activate a license for one instance.
///
/// Steps 1-4 (credential, entitlement, lifecycle gate, instance type) run
/// before the atomic acquisition; the idempotency check, capacity recount,
/// and row creation are serialized inside `activate_atomic`. An `activated`
/// event is emitted only when a new seat was granted - the idempotent path
/// is a no-op, not an error.
pub fn activate(
    conn: &mut Connection,
    master_key: &MasterKey,
    events: &EventSink,
    scope: &TenantScope,
    req: &ActivateRequest,
    client: &ClientInfo,
) -> Result<Activation> {
    let now = now();
    let (key, license) = resolve_entitlement(conn, scope, &req.license_key, &req.product_slug, now)?;

    if !license.can_activate(now) {
        return Err(AppError::LicenseCannotActivate(
            cannot_activate_reason(&license, now).to_string(),
        ));
    }

    let max_seats = license
        .max_activations_per_instance
        .limit_for(&req.instance_type)
        .ok_or_else(|| AppError::InstanceTypeNotConfigured(req.instance_type.clone()))?;

    let outcome = queries::activate_atomic(
        conn,
        master_key,
        &license,
        max_seats,
        &req.instance_type,
        &req.instance_value,
        req.device_identifier.as_deref(),
        req.device_name.as_deref(),
        client.ip_address.as_deref(),
        client.user_agent.as_deref(),
        req.metadata.as_ref(),
    )?;

    match outcome {
        ActivationOutcome::Existing(activation) => {
            tracing::debug!(
                license_id = %license.id,
                activation_id = %activation.id,
                instance_type = %req.instance_type,
                "Instance already activated; refreshed last_checked_at"
            );
            Ok(activation)
        }
        ActivationOutcome::Created(activation) => {
            events.emit(
                NewLicenseEvent::new(
                    &license.id,
                    LicenseEventType::Activated,
                    format!(
                        "License activated for {}: {}",
                        req.instance_type, req.instance_value
                    ),
                )
                .with_data(serde_json::json!({
                    "instance_type": req.instance_type,
                    "instance_value": req.instance_value,
                }))
                .with_client(client.ip_address.clone(), client.user_agent.clone()),
            );
            tracing::info!(
                license_id = %license.id,
                license_key_id = %key.id,
                activation_id = %activation.id,
                instance_type = %req.instance_type,
                instance_value = %req.instance_value,
                "License activated"
            );
            Ok(activation)
        }
    }
}

/// Release a seat. Not reversible: re-activating the same instance later
/// goes through full capacity enforcement again.
pub fn deactivate(
    conn: &mut Connection,
    events: &EventSink,
    scope: &TenantScope,
    activation_id: &str,
    client: &ClientInfo,
) -> Result<Activation> {
    let (activation, released) = queries::deactivate_atomic(conn, scope, activation_id)?;

    if released {
        events.emit(
            NewLicenseEvent::new(
                &activation.license_id,
                LicenseEventType::Deactivated,
                format!(
                    "License deactivated from {}: {}",
                    activation.instance_type, activation.instance_value
                ),
            )
            .with_client(client.ip_address.clone(), client.user_agent.clone()),
        );
        tracing::info!(
            license_id = %activation.license_id,
            activation_id = %activation.id,
            instance_type = %activation.instance_type,
            instance_value = %activation.instance_value,
            "License deactivated"
        );
    }

    Ok(activation)
}

/// Structured result of a status poll. Client software polls this endpoint,
/// so license problems are data, never errors.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LicenseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_type: Option<LicenseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    /// Per-instance-type seat usage, present only when valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entitlements: Option<BTreeMap<String, Entitlement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl StatusResult {
    fn invalid(reason: &str) -> Self {
        Self {
            valid: false,
            reason: Some(reason.to_string()),
            status: None,
            license_type: None,
            product_name: None,
            product_slug: None,
            customer_name: None,
            entitlements: None,
            expires_at: None,
        }
    }
}

/// Read-only status check for a license key and product.
///
/// Returns `Err` only on infrastructure failure; every license-level
/// problem comes back as a structured invalid result.
pub fn check_status(
    conn: &Connection,
    scope: &TenantScope,
    license_key: &str,
    product_slug: &str,
) -> Result<StatusResult> {
    let now = now();
    let key_hash = hash_secret(license_key);

    let Some(key) = queries::find_license_key_by_hash(conn, scope, &key_hash)? else {
        return Ok(StatusResult::invalid("Invalid license key"));
    };

    if !key.is_valid(now) {
        return Ok(StatusResult::invalid("License key is not usable"));
    }

    let Some(license) = queries::find_license_for_product(conn, scope, &key.id, product_slug)?
    else {
        return Ok(StatusResult::invalid("License not found for this product"));
    };

    if license.is_expired(now) {
        return Ok(StatusResult {
            expires_at: license.expires_at,
            ..StatusResult::invalid("License has expired")
        });
    }

    if license.status != LicenseStatus::Active {
        return Ok(StatusResult {
            status: Some(license.status),
            ..StatusResult::invalid("License is not active")
        });
    }

    let mut entitlements = BTreeMap::new();
    for (instance_type, max_seats) in license.max_activations_per_instance.iter() {
        let used = queries::count_distinct_active_instances(conn, &license.id, instance_type)?;
        entitlements.insert(instance_type.to_string(), Entitlement::new(max_seats, used));
    }

    Ok(StatusResult {
        valid: true,
        reason: None,
        status: Some(license.status),
        license_type: Some(license.license_type),
        product_name: Some(license.product_name),
        product_slug: Some(license.product_slug),
        customer_name: Some(license.customer_name),
        entitlements: Some(entitlements),
        expires_at: license.expires_at,
    })
}

/// Result of provisioning a license.
#[derive(Debug, Serialize)]
pub struct ProvisionedLicense {
    pub license: License,
    /// Plaintext license key - present only when a new key was minted for
    /// the customer. Subsequent products reuse the existing key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
}

/// Provision a license for a customer.
///
/// Reuses the customer's existing active license key when there is one;
/// otherwise mints a new key (returned in plaintext exactly once). At most
/// one live license per (customer, product) may exist under a brand.
pub fn provision_license(
    conn: &mut Connection,
    master_key: &MasterKey,
    events: &EventSink,
    brand_id: &str,
    input: &CreateLicense,
) -> Result<ProvisionedLicense> {
    input.max_activations_per_instance.validate()?;

    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    if queries::license_exists_for_customer_product(
        &tx,
        brand_id,
        &input.customer_email,
        &input.product_slug,
    )? {
        return Err(AppError::Conflict(format!(
            "A license for product '{}' already exists for this customer",
            input.product_slug
        )));
    }

    let existing_key =
        queries::get_active_license_key_for_customer(&tx, brand_id, &input.customer_email)?;
    let (license_key_id, plain_key) = match existing_key {
        Some(key) => (key.id, None),
        None => {
            let (key, plaintext) =
                queries::create_license_key(&tx, master_key, brand_id, &input.customer_email)?;
            (key.id, Some(plaintext))
        }
    };

    let license = queries::create_license(&tx, brand_id, &license_key_id, input)?;
    tx.commit()?;

    if plain_key.is_some() {
        events.emit(NewLicenseEvent::new(
            &license.id,
            LicenseEventType::KeyGenerated,
            "License key created for customer",
        ));
    }
    events.emit(
        NewLicenseEvent::new(
            &license.id,
            LicenseEventType::Created,
            format!("License created for customer: {}", input.customer_email),
        )
        .with_data(serde_json::json!({
            "product_slug": input.product_slug,
            "license_type": input.license_type,
        })),
    );

    tracing::info!(
        license_id = %license.id,
        brand_id = %brand_id,
        license_key_id = %license_key_id,
        product_slug = %input.product_slug,
        new_key_generated = plain_key.is_some(),
        "License created"
    );

    Ok(ProvisionedLicense {
        license,
        license_key: plain_key,
    })
}

fn fetch_license(conn: &Connection, scope: &TenantScope, id: &str) -> Result<License> {
    queries::get_license_by_id(conn, scope, id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))
}

/// Suspend an active license.
pub fn suspend_license(
    conn: &Connection,
    events: &EventSink,
    scope: &TenantScope,
    id: &str,
) -> Result<License> {
    let license = fetch_license(conn, scope, id)?;
    let ok = queries::transition_license_status(
        conn,
        scope,
        id,
        &[LicenseStatus::Active],
        LicenseStatus::Suspended,
    )?;
    if !ok {
        return Err(AppError::Conflict(format!(
            "Only an active license can be suspended (status: {})",
            license.status.as_str()
        )));
    }

    events.emit(NewLicenseEvent::new(
        id,
        LicenseEventType::Suspended,
        "License suspended",
    ));
    tracing::info!(license_id = %id, "License suspended");
    fetch_license(conn, scope, id)
}

/// Resume a suspended license. Cancellation is terminal and cannot be
/// resumed from.
pub fn resume_license(
    conn: &Connection,
    events: &EventSink,
    scope: &TenantScope,
    id: &str,
) -> Result<License> {
    let license = fetch_license(conn, scope, id)?;
    let ok = queries::transition_license_status(
        conn,
        scope,
        id,
        &[LicenseStatus::Suspended],
        LicenseStatus::Active,
    )?;
    if !ok {
        return Err(AppError::Conflict(format!(
            "Only a suspended license can be resumed (status: {})",
            license.status.as_str()
        )));
    }

    events.emit(NewLicenseEvent::new(
        id,
        LicenseEventType::Resumed,
        "License resumed",
    ));
    tracing::info!(license_id = %id, "License resumed");
    fetch_license(conn, scope, id)
}

/// Renew a license: push the expiry forward by `days` and return it to
/// active status. Rejected for perpetual licenses (renewal is meaningless)
/// and for cancelled licenses (terminal).
pub fn renew_license(
    conn: &Connection,
    events: &EventSink,
    scope: &TenantScope,
    id: &str,
    days: i64,
) -> Result<License> {
    if days <= 0 {
        return Err(AppError::BadRequest(
            "Renewal period must be a positive number of days".into(),
        ));
    }

    let license = fetch_license(conn, scope, id)?;
    if license.license_type == LicenseType::Perpetual {
        return Err(AppError::BadRequest(
            "A perpetual license cannot be renewed".into(),
        ));
    }
    if license.status == LicenseStatus::Cancelled {
        return Err(AppError::Conflict(
            "A cancelled license cannot be renewed".into(),
        ));
    }

    let new_expires_at = now() + days * 86400;
    let ok = queries::renew_license(conn, scope, id, new_expires_at)?;
    if !ok {
        // Lost a race against a concurrent cancel
        return Err(AppError::Conflict(
            "A cancelled license cannot be renewed".into(),
        ));
    }

    events.emit(
        NewLicenseEvent::new(
            id,
            LicenseEventType::Renewed,
            format!("License renewed for {} days", days),
        )
        .with_data(serde_json::json!({ "expires_at": new_expires_at })),
    );
    tracing::info!(license_id = %id, expires_at = new_expires_at, "License renewed");
    fetch_license(conn, scope, id)
}

/// Cancel a license. Terminal and irreversible. Existing activations are
/// not cascaded; status polls report the license invalid from now on.
pub fn cancel_license(
    conn: &Connection,
    events: &EventSink,
    scope: &TenantScope,
    id: &str,
) -> Result<License> {
    let license = fetch_license(conn, scope, id)?;
    if license.status == LicenseStatus::Cancelled {
        return Err(AppError::Conflict("License is already cancelled".into()));
    }

    let ok = queries::transition_license_status(
        conn,
        scope,
        id,
        &[
            LicenseStatus::Active,
            LicenseStatus::Suspended,
            LicenseStatus::Expired,
        ],
        LicenseStatus::Cancelled,
    )?;
    if !ok {
        return Err(AppError::Conflict("License is already cancelled".into()));
    }

    events.emit(NewLicenseEvent::new(
        id,
        LicenseEventType::Cancelled,
        "License cancelled",
    ));
    tracing::info!(license_id = %id, "License cancelled");
    fetch_license(conn, scope, id)
}

/// One pass of the expiry sweep: transition overdue licenses and license
/// keys to `expired` and emit events. Scheduled by the binary, never by the
/// engine itself.
pub fn sweep_expired(conn: &Connection, events: &EventSink) -> Result<(usize, usize)> {
    let now = now();

    let expired_licenses = queries::mark_expired_licenses(conn, now)?;
    for license in &expired_licenses {
        events.emit(NewLicenseEvent::new(
            &license.id,
            LicenseEventType::Expired,
            "License expired",
        ));
    }

    let expired_keys = queries::mark_expired_license_keys(conn, now)?;

    if !expired_licenses.is_empty() || expired_keys > 0 {
        tracing::info!(
            licenses = expired_licenses.len(),
            license_keys = expired_keys,
            "Expiry sweep complete"
        );
    }

    Ok((expired_licenses.len(), expired_keys))
}
