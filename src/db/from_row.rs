//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on unexpected stored values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse an optional JSON text column.
fn parse_json_opt(
    row: &Row,
    col: usize,
    col_name: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    match row.get::<_, Option<String>>(col)? {
        Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                col,
                col_name.to_string(),
                rusqlite::types::Type::Text,
            )
        }),
        None => Ok(None),
    }
}

/// Trait for constructing a type from a database row.
///
/// Implementing this trait allows using the `query_one` and `query_all`
/// helper functions, reducing repetitive row mapping closures.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const BRAND_COLS: &str = "id, name, slug, description, contact_email, website, settings, is_active, created_at, updated_at, deleted_at";

pub const API_KEY_COLS: &str = "id, brand_id, name, prefix, key_hash, permissions, last_used_at, expires_at, is_active, created_at, updated_at, deleted_at";

pub const LICENSE_KEY_COLS: &str = "id, brand_id, customer_email, key, key_hash, status, expires_at, metadata, created_at, updated_at, deleted_at";

pub const LICENSE_COLS: &str = "id, license_key_id, brand_id, customer_email, customer_name, product_name, product_slug, product_sku, license_type, max_activations_per_instance, current_activations, expires_at, status, metadata, created_at, updated_at, deleted_at";

pub const ACTIVATION_COLS: &str = "id, license_id, instance_type, instance_value, device_identifier, device_name, ip_address, user_agent, status, activated_at, deactivated_at, last_checked_at, metadata, created_at, updated_at";

/// Activation columns qualified for joins through the owning license.
pub const ACTIVATION_COLS_QUALIFIED: &str = "a.id, a.license_id, a.instance_type, a.instance_value, a.device_identifier, a.device_name, a.ip_address, a.user_agent, a.status, a.activated_at, a.deactivated_at, a.last_checked_at, a.metadata, a.created_at, a.updated_at";

pub const LICENSE_EVENT_COLS: &str =
    "id, license_id, event_type, description, event_data, ip_address, user_agent, created_at";

// ============ FromRow Implementations ============

impl FromRow for Brand {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Brand {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            description: row.get(3)?,
            contact_email: row.get(4)?,
            website: row.get(5)?,
            settings: parse_json_opt(row, 6, "settings")?,
            is_active: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            deleted_at: row.get(10)?,
        })
    }
}

impl FromRow for ApiKey {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        // NULL permissions column means an unrestricted key
        let permissions: Vec<String> = match row.get::<_, Option<String>>(5)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    5,
                    "permissions".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?,
            None => Vec::new(),
        };
        Ok(ApiKey {
            id: row.get(0)?,
            brand_id: row.get(1)?,
            name: row.get(2)?,
            prefix: row.get(3)?,
            key_hash: row.get(4)?,
            permissions,
            last_used_at: row.get(6)?,
            expires_at: row.get(7)?,
            is_active: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            deleted_at: row.get(11)?,
        })
    }
}

impl FromRow for LicenseKey {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseKey {
            id: row.get(0)?,
            brand_id: row.get(1)?,
            customer_email: row.get(2)?,
            key_encrypted: row.get(3)?,
            key_hash: row.get(4)?,
            status: parse_enum(row, 5, "status")?,
            expires_at: row.get(6)?,
            metadata: parse_json_opt(row, 7, "metadata")?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            deleted_at: row.get(10)?,
        })
    }
}

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let limits_raw: String = row.get(9)?;
        let max_activations_per_instance =
            ActivationLimits::from_json(&limits_raw).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    9,
                    "max_activations_per_instance".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?;
        Ok(License {
            id: row.get(0)?,
            license_key_id: row.get(1)?,
            brand_id: row.get(2)?,
            customer_email: row.get(3)?,
            customer_name: row.get(4)?,
            product_name: row.get(5)?,
            product_slug: row.get(6)?,
            product_sku: row.get(7)?,
            license_type: parse_enum(row, 8, "license_type")?,
            max_activations_per_instance,
            current_activations: row.get(10)?,
            expires_at: row.get(11)?,
            status: parse_enum(row, 12, "status")?,
            metadata: parse_json_opt(row, 13, "metadata")?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
            deleted_at: row.get(16)?,
        })
    }
}

impl FromRow for Activation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Activation {
            id: row.get(0)?,
            license_id: row.get(1)?,
            instance_type: row.get(2)?,
            instance_value: row.get(3)?,
            device_identifier_encrypted: row.get(4)?,
            device_name: row.get(5)?,
            ip_address_encrypted: row.get(6)?,
            user_agent: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            activated_at: row.get(9)?,
            deactivated_at: row.get(10)?,
            last_checked_at: row.get(11)?,
            metadata: parse_json_opt(row, 12, "metadata")?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

impl FromRow for LicenseEvent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseEvent {
            id: row.get(0)?,
            license_id: row.get(1)?,
            event_type: parse_enum(row, 2, "event_type")?,
            description: row.get(3)?,
            event_data: parse_json_opt(row, 4, "event_data")?,
            ip_address: row.get(5)?,
            user_agent: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}
