use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::crypto::{MasterKey, hash_secret};
use crate::error::{AppError, Result};
use crate::keygen;
use crate::models::*;
use crate::tenancy::TenantScope;

use super::from_row::{
    ACTIVATION_COLS, ACTIVATION_COLS_QUALIFIED, API_KEY_COLS, BRAND_COLS, LICENSE_COLS,
    LICENSE_EVENT_COLS, LICENSE_KEY_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

fn json_opt(value: &Option<serde_json::Value>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).map_err(Into::into))
        .transpose()
}

// ============ Brands ============

pub fn create_brand(conn: &Connection, input: &CreateBrand) -> Result<Brand> {
    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM brands WHERE (slug = ?1 OR name = ?2) AND deleted_at IS NULL",
            params![&input.slug, &input.name],
            |row| row.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(AppError::Conflict(format!(
            "Brand with name '{}' or slug '{}' already exists",
            input.name, input.slug
        )));
    }

    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO brands (id, name, slug, description, contact_email, website, settings, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 1, ?7, ?7)",
        params![&id, &input.name, &input.slug, &input.description, &input.contact_email, &input.website, now],
    )?;

    Ok(Brand {
        id,
        name: input.name.clone(),
        slug: input.slug.clone(),
        description: input.description.clone(),
        contact_email: input.contact_email.clone(),
        website: input.website.clone(),
        settings: None,
        is_active: true,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

pub fn get_brand_by_id(conn: &Connection, id: &str) -> Result<Option<Brand>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM brands WHERE id = ?1 AND deleted_at IS NULL",
            BRAND_COLS
        ),
        &[&id],
    )
}

pub fn get_brand_by_slug(conn: &Connection, slug: &str) -> Result<Option<Brand>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM brands WHERE slug = ?1 AND deleted_at IS NULL",
            BRAND_COLS
        ),
        &[&slug],
    )
}

// ============ API Keys ============

/// Create an API key for a brand. Returns the record and the plaintext
/// credential - the only time the plaintext is ever available.
pub fn create_api_key(
    conn: &Connection,
    brand_id: &str,
    input: &CreateApiKey,
) -> Result<(ApiKey, String)> {
    let (plaintext, prefix) = keygen::generate_api_key();
    let key_hash = hash_secret(&plaintext);
    let id = gen_id();
    let now = now();
    let expires_at = input.expires_in_days.map(|days| now + days * 86400);
    let permissions = input.permissions.clone().unwrap_or_default();
    let permissions_json = if permissions.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&permissions)?)
    };

    conn.execute(
        "INSERT INTO api_keys (id, brand_id, name, prefix, key_hash, permissions, last_used_at, expires_at, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, 1, ?8, ?8)",
        params![&id, brand_id, &input.name, &prefix, &key_hash, &permissions_json, expires_at, now],
    )?;

    Ok((
        ApiKey {
            id,
            brand_id: brand_id.to_string(),
            name: input.name.clone(),
            prefix,
            key_hash,
            permissions,
            last_used_at: None,
            expires_at,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        },
        plaintext,
    ))
}

/// Look up an API key by its non-secret prefix. Authentication entry point:
/// hash comparison and validity checks belong to the caller so each failure
/// stays distinguishable.
pub fn get_api_key_by_prefix(conn: &Connection, prefix: &str) -> Result<Option<ApiKey>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM api_keys WHERE prefix = ?1 AND deleted_at IS NULL",
            API_KEY_COLS
        ),
        &[&prefix],
    )
}

/// Best-effort last-use stamp. Callers ignore the result.
pub fn touch_api_key_last_used(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE api_keys SET last_used_at = ?1 WHERE id = ?2",
        params![now(), id],
    )?;
    Ok(())
}

pub fn list_api_keys(conn: &Connection, scope: &TenantScope) -> Result<Vec<ApiKey>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM api_keys
             WHERE deleted_at IS NULL AND (?1 IS NULL OR brand_id = ?1)
             ORDER BY created_at DESC",
            API_KEY_COLS
        ),
        &[&scope.brand_param()],
    )
}

pub fn get_api_key_by_id(conn: &Connection, scope: &TenantScope, id: &str) -> Result<Option<ApiKey>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM api_keys
             WHERE id = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR brand_id = ?2)",
            API_KEY_COLS
        ),
        &[&id, &scope.brand_param()],
    )
}

/// Rotate an API key in place: new prefix and secret, same record.
/// Returns the updated record and the new plaintext credential.
pub fn rotate_api_key(
    conn: &Connection,
    scope: &TenantScope,
    id: &str,
) -> Result<Option<(ApiKey, String)>> {
    let Some(existing) = get_api_key_by_id(conn, scope, id)? else {
        return Ok(None);
    };

    let (plaintext, prefix) = keygen::generate_api_key();
    let key_hash = hash_secret(&plaintext);
    let now = now();

    conn.execute(
        "UPDATE api_keys SET prefix = ?1, key_hash = ?2, updated_at = ?3 WHERE id = ?4",
        params![&prefix, &key_hash, now, &existing.id],
    )?;

    Ok(Some((
        ApiKey {
            prefix,
            key_hash,
            updated_at: now,
            ..existing
        },
        plaintext,
    )))
}

/// Revoke an API key (tombstoned; disappears from lists and fails auth).
pub fn revoke_api_key(conn: &Connection, scope: &TenantScope, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE api_keys SET is_active = 0, deleted_at = ?1, updated_at = ?1
         WHERE id = ?2 AND deleted_at IS NULL AND (?3 IS NULL OR brand_id = ?3)",
        params![now(), id, scope.brand_param()],
    )?;
    Ok(affected > 0)
}

// ============ License Keys ============

/// Create a license key for a customer. The generated key is hashed for
/// lookup and envelope-encrypted for display; the plaintext is returned
/// exactly once.
pub fn create_license_key(
    conn: &Connection,
    master_key: &MasterKey,
    brand_id: &str,
    customer_email: &str,
) -> Result<(LicenseKey, String)> {
    let (plaintext, key_hash) = keygen::unique_license_key(conn)?;
    let key_encrypted = master_key.encrypt_field(brand_id, plaintext.as_bytes())?;
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO license_keys (id, brand_id, customer_email, key, key_hash, status, expires_at, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'active', NULL, NULL, ?6, ?6)",
        params![&id, brand_id, customer_email, &key_encrypted, &key_hash, now],
    )?;

    Ok((
        LicenseKey {
            id,
            brand_id: brand_id.to_string(),
            customer_email: customer_email.to_string(),
            key_encrypted,
            key_hash,
            status: LicenseKeyStatus::Active,
            expires_at: None,
            metadata: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        },
        plaintext,
    ))
}

/// Resolve a license key by the hash of the raw credential.
pub fn find_license_key_by_hash(
    conn: &Connection,
    scope: &TenantScope,
    key_hash: &str,
) -> Result<Option<LicenseKey>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM license_keys
             WHERE key_hash = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR brand_id = ?2)",
            LICENSE_KEY_COLS
        ),
        &[&key_hash, &scope.brand_param()],
    )
}

/// The reusable active key for a customer, if one exists. Provisioning
/// attaches further product licenses to it instead of minting a new key.
pub fn get_active_license_key_for_customer(
    conn: &Connection,
    brand_id: &str,
    customer_email: &str,
) -> Result<Option<LicenseKey>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM license_keys
             WHERE brand_id = ?1 AND customer_email = ?2 AND status = 'active' AND deleted_at IS NULL
             ORDER BY created_at DESC",
            LICENSE_KEY_COLS
        ),
        &[&brand_id, &customer_email],
    )
}

pub fn get_license_key_by_id(
    conn: &Connection,
    scope: &TenantScope,
    id: &str,
) -> Result<Option<LicenseKey>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM license_keys
             WHERE id = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR brand_id = ?2)",
            LICENSE_KEY_COLS
        ),
        &[&id, &scope.brand_param()],
    )
}

pub fn list_license_keys(
    conn: &Connection,
    scope: &TenantScope,
    limit: i64,
    offset: i64,
) -> Result<(Vec<LicenseKey>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM license_keys WHERE deleted_at IS NULL AND (?1 IS NULL OR brand_id = ?1)",
        params![scope.brand_param()],
        |row| row.get(0),
    )?;
    let rows = query_all(
        conn,
        &format!(
            "SELECT {} FROM license_keys
             WHERE deleted_at IS NULL AND (?1 IS NULL OR brand_id = ?1)
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            LICENSE_KEY_COLS
        ),
        &[&scope.brand_param(), &limit, &offset],
    )?;
    Ok((rows, total))
}

/// Cancel a license key. Terminal: a cancelled key never validates again.
pub fn cancel_license_key(conn: &Connection, scope: &TenantScope, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE license_keys SET status = 'cancelled', updated_at = ?1
         WHERE id = ?2 AND status != 'cancelled' AND deleted_at IS NULL
           AND (?3 IS NULL OR brand_id = ?3)",
        params![now(), id, scope.brand_param()],
    )?;
    Ok(affected > 0)
}

/// Expiry sweep over license keys. Returns the number of keys expired.
pub fn mark_expired_license_keys(conn: &Connection, now: i64) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE license_keys SET status = 'expired', updated_at = ?1
         WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= ?1
           AND deleted_at IS NULL",
        params![now],
    )?;
    Ok(affected)
}

// ============ Licenses ============

/// Create a license under an existing license key. Limits are validated
/// here as the last line of defense; uniqueness of (customer, product) is
/// the provisioning flow's responsibility.
pub fn create_license(
    conn: &Connection,
    brand_id: &str,
    license_key_id: &str,
    input: &CreateLicense,
) -> Result<License> {
    input.max_activations_per_instance.validate()?;

    let id = gen_id();
    let now = now();
    let limits_json = input.max_activations_per_instance.to_json()?;
    let metadata_json = json_opt(&input.metadata)?;

    conn.execute(
        "INSERT INTO licenses (id, license_key_id, brand_id, customer_email, customer_name, product_name, product_slug, product_sku, license_type, max_activations_per_instance, current_activations, expires_at, status, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, 'active', ?12, ?13, ?13)",
        params![
            &id,
            license_key_id,
            brand_id,
            &input.customer_email,
            &input.customer_name,
            &input.product_name,
            &input.product_slug,
            &input.product_sku,
            input.license_type.as_str(),
            &limits_json,
            input.expires_at,
            &metadata_json,
            now
        ],
    )?;

    Ok(License {
        id,
        license_key_id: license_key_id.to_string(),
        brand_id: brand_id.to_string(),
        customer_email: input.customer_email.clone(),
        customer_name: input.customer_name.clone(),
        product_name: input.product_name.clone(),
        product_slug: input.product_slug.clone(),
        product_sku: input.product_sku.clone(),
        license_type: input.license_type,
        max_activations_per_instance: input.max_activations_per_instance.clone(),
        current_activations: 0,
        expires_at: input.expires_at,
        status: LicenseStatus::Active,
        metadata: input.metadata.clone(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

pub fn get_license_by_id(
    conn: &Connection,
    scope: &TenantScope,
    id: &str,
) -> Result<Option<License>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses
             WHERE id = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR brand_id = ?2)",
            LICENSE_COLS
        ),
        &[&id, &scope.brand_param()],
    )
}

/// The license for a product under a license key, if any.
pub fn find_license_for_product(
    conn: &Connection,
    scope: &TenantScope,
    license_key_id: &str,
    product_slug: &str,
) -> Result<Option<License>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses
             WHERE license_key_id = ?1 AND product_slug = ?2 AND deleted_at IS NULL
               AND (?3 IS NULL OR brand_id = ?3)",
            LICENSE_COLS
        ),
        &[&license_key_id, &product_slug, &scope.brand_param()],
    )
}

/// Whether a live license already exists for (customer, product) under the
/// brand. No two licenses for the same customer and product may coexist.
pub fn license_exists_for_customer_product(
    conn: &Connection,
    brand_id: &str,
    customer_email: &str,
    product_slug: &str,
) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM licenses
             WHERE brand_id = ?1 AND customer_email = ?2 AND product_slug = ?3
               AND deleted_at IS NULL",
            params![brand_id, customer_email, product_slug],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn list_licenses(
    conn: &Connection,
    scope: &TenantScope,
    limit: i64,
    offset: i64,
) -> Result<(Vec<License>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM licenses WHERE deleted_at IS NULL AND (?1 IS NULL OR brand_id = ?1)",
        params![scope.brand_param()],
        |row| row.get(0),
    )?;
    let rows = query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses
             WHERE deleted_at IS NULL AND (?1 IS NULL OR brand_id = ?1)
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            LICENSE_COLS
        ),
        &[&scope.brand_param(), &limit, &offset],
    )?;
    Ok((rows, total))
}

pub fn list_licenses_for_customer(
    conn: &Connection,
    scope: &TenantScope,
    customer_email: &str,
) -> Result<Vec<License>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses
             WHERE customer_email = ?1 AND deleted_at IS NULL
               AND (?2 IS NULL OR brand_id = ?2)
             ORDER BY created_at DESC",
            LICENSE_COLS
        ),
        &[&customer_email, &scope.brand_param()],
    )
}

pub fn set_license_status(
    conn: &Connection,
    scope: &TenantScope,
    id: &str,
    status: LicenseStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND deleted_at IS NULL AND (?4 IS NULL OR brand_id = ?4)",
        params![status.as_str(), now(), id, scope.brand_param()],
    )?;
    Ok(affected > 0)
}

/// Guarded status transition: only fires while the license is in one of the
/// expected source states, so concurrent lifecycle calls cannot clobber a
/// terminal state.
pub fn transition_license_status(
    conn: &Connection,
    scope: &TenantScope,
    id: &str,
    from: &[LicenseStatus],
    to: LicenseStatus,
) -> Result<bool> {
    let allowed: Vec<String> = from.iter().map(|s| format!("'{}'", s.as_str())).collect();
    let sql = format!(
        "UPDATE licenses SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND status IN ({}) AND deleted_at IS NULL
           AND (?4 IS NULL OR brand_id = ?4)",
        allowed.join(", ")
    );
    let affected = conn.execute(
        &sql,
        params![to.as_str(), now(), id, scope.brand_param()],
    )?;
    Ok(affected > 0)
}

/// Renew: push the expiry forward and return the license to active status.
/// Cancelled licenses are terminal and perpetual licenses have no expiry to
/// push; the guard keeps a concurrent cancel from being overwritten.
pub fn renew_license(
    conn: &Connection,
    scope: &TenantScope,
    id: &str,
    new_expires_at: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET expires_at = ?1, status = 'active', updated_at = ?2
         WHERE id = ?3 AND status != 'cancelled' AND license_type != 'perpetual'
           AND deleted_at IS NULL AND (?4 IS NULL OR brand_id = ?4)",
        params![new_expires_at, now(), id, scope.brand_param()],
    )?;
    Ok(affected > 0)
}

/// Expiry sweep over licenses. Perpetual licenses are never touched.
/// Returns the licenses that were transitioned so events can be emitted.
pub fn mark_expired_licenses(conn: &Connection, now: i64) -> Result<Vec<License>> {
    let due: Vec<License> = query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses
             WHERE status = 'active' AND license_type != 'perpetual'
               AND expires_at IS NOT NULL AND expires_at <= ?1 AND deleted_at IS NULL",
            LICENSE_COLS
        ),
        &[&now],
    )?;

    for license in &due {
        conn.execute(
            "UPDATE licenses SET status = 'expired', updated_at = ?1 WHERE id = ?2",
            params![now, &license.id],
        )?;
    }

    Ok(due)
}

// ============ Activations ============

/// Result of attempting to acquire a seat for a license.
pub enum ActivationOutcome {
    /// The instance was already activated; the existing row is returned
    /// with a refreshed last-checked stamp. Seat limits are not re-enforced.
    Existing(Activation),
    /// A new seat was granted.
    Created(Activation),
}

/// Distinct-value seat usage for (license, instance_type). Re-checking the
/// same instance never consumes additional capacity.
pub fn count_distinct_active_instances(
    conn: &Connection,
    license_id: &str,
    instance_type: &str,
) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(DISTINCT instance_value) FROM activations
         WHERE license_id = ?1 AND instance_type = ?2 AND status = 'active'",
        params![license_id, instance_type],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Atomically acquire a seat for a license, enforcing the per-instance-type
/// limit under concurrency.
///
/// The transaction uses IMMEDIATE mode to take the write lock up front, so
/// the idempotency lookup and the distinct-count recount are guaranteed
/// fresh at commit time; two concurrent activations for the same license
/// serialize here. The partial unique index on active
/// (license_id, instance_type, instance_value) backs the idempotency race
/// at the storage level.
///
/// Credential and license validity are the caller's responsibility and are
/// checked before this point, so the most specific error wins.
#[allow(clippy::too_many_arguments)]
pub fn activate_atomic(
    conn: &mut Connection,
    master_key: &MasterKey,
    license: &License,
    max_seats: u32,
    instance_type: &str,
    instance_value: &str,
    device_identifier: Option<&str>,
    device_name: Option<&str>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    metadata: Option<&serde_json::Value>,
) -> Result<ActivationOutcome> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    let now = now();

    // Idempotency: re-activating an already-active instance is a no-op that
    // refreshes last_checked_at and skips seat enforcement entirely.
    let existing: Option<Activation> = query_one(
        &tx,
        &format!(
            "SELECT {} FROM activations
             WHERE license_id = ?1 AND instance_type = ?2 AND instance_value = ?3
               AND status = 'active'",
            ACTIVATION_COLS
        ),
        &[&license.id.as_str(), &instance_type, &instance_value],
    )?;

    if let Some(activation) = existing {
        tx.execute(
            "UPDATE activations SET last_checked_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![now, &activation.id],
        )?;
        tx.commit()?;
        return Ok(ActivationOutcome::Existing(Activation {
            last_checked_at: Some(now),
            updated_at: now,
            ..activation
        }));
    }

    let used: u32 = tx.query_row(
        "SELECT COUNT(DISTINCT instance_value) FROM activations
         WHERE license_id = ?1 AND instance_type = ?2 AND status = 'active'",
        params![&license.id, instance_type],
        |row| row.get(0),
    )?;

    if used >= max_seats {
        return Err(AppError::MaxActivationsReached {
            instance_type: instance_type.to_string(),
            max: max_seats,
        });
    }

    let id = gen_id();
    let device_identifier_encrypted = device_identifier
        .map(|v| master_key.encrypt_field(&license.brand_id, v.as_bytes()))
        .transpose()?;
    let ip_address_encrypted = ip_address
        .map(|v| master_key.encrypt_field(&license.brand_id, v.as_bytes()))
        .transpose()?;
    let metadata_owned = metadata.cloned();
    let metadata_json = json_opt(&metadata_owned)?;

    tx.execute(
        "INSERT INTO activations (id, license_id, instance_type, instance_value, device_identifier, device_name, ip_address, user_agent, status, activated_at, deactivated_at, last_checked_at, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active', ?9, NULL, ?9, ?10, ?9, ?9)",
        params![
            &id,
            &license.id,
            instance_type,
            instance_value,
            &device_identifier_encrypted,
            device_name,
            &ip_address_encrypted,
            user_agent,
            now,
            &metadata_json
        ],
    )?;

    tx.execute(
        "UPDATE licenses SET current_activations = current_activations + 1, updated_at = ?1
         WHERE id = ?2",
        params![now, &license.id],
    )?;

    tx.commit()?;

    Ok(ActivationOutcome::Created(Activation {
        id,
        license_id: license.id.clone(),
        instance_type: instance_type.to_string(),
        instance_value: instance_value.to_string(),
        device_identifier_encrypted,
        device_name: device_name.map(String::from),
        ip_address_encrypted,
        user_agent: user_agent.map(String::from),
        status: ActivationStatus::Active,
        activated_at: now,
        deactivated_at: None,
        last_checked_at: Some(now),
        metadata: metadata_owned,
        created_at: now,
        updated_at: now,
    }))
}

/// Resolve an activation by id, scoped through the owning license. Any
/// direct query against activations that skips this join would leak
/// cross-tenant data.
pub fn get_activation_by_id(
    conn: &Connection,
    scope: &TenantScope,
    id: &str,
) -> Result<Option<Activation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM activations a
             JOIN licenses l ON l.id = a.license_id
             WHERE a.id = ?1 AND l.deleted_at IS NULL AND (?2 IS NULL OR l.brand_id = ?2)",
            ACTIVATION_COLS_QUALIFIED
        ),
        &[&id, &scope.brand_param()],
    )
}

/// Atomically release a seat. The guarded UPDATE fires only while the row
/// is still active, so the license counter is decremented at most once per
/// activation even under concurrent deactivations.
///
/// Returns the deactivated row and whether this call performed the release
/// (false = the row was already inactive), or `ActivationNotFound` when the
/// id does not resolve inside the scope.
pub fn deactivate_atomic(
    conn: &mut Connection,
    scope: &TenantScope,
    activation_id: &str,
) -> Result<(Activation, bool)> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    let now = now();

    let activation: Option<Activation> = query_one(
        &tx,
        &format!(
            "SELECT {} FROM activations a
             JOIN licenses l ON l.id = a.license_id
             WHERE a.id = ?1 AND l.deleted_at IS NULL AND (?2 IS NULL OR l.brand_id = ?2)",
            ACTIVATION_COLS_QUALIFIED
        ),
        &[&activation_id, &scope.brand_param()],
    )?;

    let Some(activation) = activation else {
        return Err(AppError::ActivationNotFound);
    };

    let released = tx.execute(
        "UPDATE activations SET status = 'inactive', deactivated_at = ?1, updated_at = ?1
         WHERE id = ?2 AND status = 'active'",
        params![now, &activation.id],
    )?;

    if released > 0 {
        tx.execute(
            "UPDATE licenses SET current_activations = MAX(current_activations - 1, 0), updated_at = ?1
             WHERE id = ?2",
            params![now, &activation.license_id],
        )?;
    }

    tx.commit()?;

    let released = released > 0;
    let deactivated_at = if released {
        Some(now)
    } else {
        activation.deactivated_at
    };
    Ok((
        Activation {
            status: ActivationStatus::Inactive,
            deactivated_at,
            updated_at: if released { now } else { activation.updated_at },
            ..activation
        },
        released,
    ))
}

pub fn list_activations_for_license(
    conn: &Connection,
    scope: &TenantScope,
    license_id: &str,
) -> Result<Vec<Activation>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM activations a
             JOIN licenses l ON l.id = a.license_id
             WHERE a.license_id = ?1 AND l.deleted_at IS NULL
               AND (?2 IS NULL OR l.brand_id = ?2)
             ORDER BY a.activated_at DESC",
            ACTIVATION_COLS_QUALIFIED
        ),
        &[&license_id, &scope.brand_param()],
    )
}

// ============ License Events ============

pub fn insert_license_event(conn: &Connection, event: &NewLicenseEvent) -> Result<LicenseEvent> {
    let id = gen_id();
    let now = now();
    let data_json = json_opt(&event.event_data)?;

    conn.execute(
        "INSERT INTO license_events (id, license_id, event_type, description, event_data, ip_address, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            &event.license_id,
            event.event_type.as_str(),
            &event.description,
            &data_json,
            &event.ip_address,
            &event.user_agent,
            now
        ],
    )?;

    Ok(LicenseEvent {
        id,
        license_id: event.license_id.clone(),
        event_type: event.event_type,
        description: event.description.clone(),
        event_data: event.event_data.clone(),
        ip_address: event.ip_address.clone(),
        user_agent: event.user_agent.clone(),
        created_at: now,
    })
}

// ============ Maintenance ============

/// Counts of physically removed rows per table.
#[derive(Debug, Default)]
pub struct PurgeResult {
    pub brands: usize,
    pub api_keys: usize,
    pub license_keys: usize,
    pub licenses: usize,
}

impl PurgeResult {
    pub fn total(&self) -> usize {
        self.brands + self.api_keys + self.license_keys + self.licenses
    }
}

/// Physically remove rows tombstoned longer than the retention window.
/// Soft-deleted rows are already invisible to every query; purging is a
/// separate, explicit maintenance operation, never part of request flow.
/// Child rows (activations, events) go with their license via FK cascade.
pub fn purge_soft_deleted(conn: &Connection, retention_days: i64) -> Result<PurgeResult> {
    let cutoff = now() - retention_days * 86400;

    let licenses = conn.execute(
        "DELETE FROM licenses WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
        params![cutoff],
    )?;
    let license_keys = conn.execute(
        "DELETE FROM license_keys WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
        params![cutoff],
    )?;
    let api_keys = conn.execute(
        "DELETE FROM api_keys WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
        params![cutoff],
    )?;
    let brands = conn.execute(
        "DELETE FROM brands WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
        params![cutoff],
    )?;

    Ok(PurgeResult {
        brands,
        api_keys,
        license_keys,
        licenses,
    })
}

pub fn list_events_for_license(
    conn: &Connection,
    scope: &TenantScope,
    license_id: &str,
) -> Result<Vec<LicenseEvent>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM license_events
             WHERE license_id = ?1
               AND (?2 IS NULL OR EXISTS (
                    SELECT 1 FROM licenses l
                    WHERE l.id = license_events.license_id AND l.brand_id = ?2))
             ORDER BY created_at DESC",
            LICENSE_EVENT_COLS
        ),
        &[&license_id, &scope.brand_param()],
    )
}
