//! Test utilities and fixtures for Licensor integration tests

#![allow(dead_code)]

use axum::Router;
use rusqlite::Connection;

pub use licensor::crypto::MasterKey;
pub use licensor::db::{AppState, DbPool, create_pool, init_db, queries};
pub use licensor::error::AppError;
pub use licensor::events::EventSink;
pub use licensor::handlers;
pub use licensor::licensing::{self, ClientInfo};
pub use licensor::models::*;
pub use licensor::tenancy::TenantScope;

/// Create a test master key (deterministic for testing)
pub fn test_master_key() -> MasterKey {
    // Fixed 32-byte key - ONLY for testing
    MasterKey::from_bytes([0u8; 32])
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create a file-backed pool for tests that need multiple connections
/// (concurrency, HTTP app state). The TempPath guard keeps the file alive.
pub fn setup_test_pool() -> (DbPool, tempfile::TempPath) {
    let file = tempfile::NamedTempFile::new().expect("Failed to create temp database file");
    let path = file.into_temp_path();
    let pool = create_pool(path.to_str().expect("temp path is valid UTF-8"))
        .expect("Failed to create test pool");
    {
        let conn = pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    (pool, path)
}

/// Create a test brand
pub fn create_test_brand(conn: &Connection, name: &str, slug: &str) -> Brand {
    let input = CreateBrand {
        name: name.to_string(),
        slug: slug.to_string(),
        description: None,
        contact_email: None,
        website: None,
    };
    queries::create_brand(conn, &input).expect("Failed to create test brand")
}

/// Create a test API key for a brand. None = unrestricted permissions.
pub fn create_test_api_key(
    conn: &Connection,
    brand_id: &str,
    permissions: Option<Vec<String>>,
) -> (ApiKey, String) {
    let input = CreateApiKey {
        name: "test key".to_string(),
        permissions,
        expires_in_days: None,
    };
    queries::create_api_key(conn, brand_id, &input).expect("Failed to create test API key")
}

/// Build activation limits from pairs
pub fn limits(pairs: &[(&str, u32)]) -> ActivationLimits {
    ActivationLimits::new(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect(),
    )
}

/// Provision a test license. Returns the license and the plaintext key
/// (None when the customer's existing key was reused).
pub fn provision_test_license(
    conn: &mut Connection,
    brand_id: &str,
    customer_email: &str,
    product_slug: &str,
    seat_limits: &[(&str, u32)],
    license_type: LicenseType,
    expires_at: Option<i64>,
) -> (License, Option<String>) {
    let input = CreateLicense {
        customer_email: customer_email.to_string(),
        customer_name: format!("Customer {}", customer_email),
        product_name: format!("Product {}", product_slug),
        product_slug: product_slug.to_string(),
        product_sku: None,
        license_type,
        max_activations_per_instance: limits(seat_limits),
        expires_at,
        metadata: None,
    };
    let provisioned = licensing::provision_license(
        conn,
        &test_master_key(),
        &EventSink::disabled(),
        brand_id,
        &input,
    )
    .expect("Failed to provision test license");
    (provisioned.license, provisioned.license_key)
}

/// Run an activation through the engine with no event subscriber.
pub fn activate_instance(
    conn: &mut Connection,
    scope: &TenantScope,
    license_key: &str,
    product_slug: &str,
    instance_type: &str,
    instance_value: &str,
) -> licensor::error::Result<Activation> {
    let req = ActivateRequest {
        license_key: license_key.to_string(),
        product_slug: product_slug.to_string(),
        instance_type: instance_type.to_string(),
        instance_value: instance_value.to_string(),
        device_identifier: None,
        device_name: None,
        metadata: None,
    };
    licensing::activate(
        conn,
        &test_master_key(),
        &EventSink::disabled(),
        scope,
        &req,
        &ClientInfo::default(),
    )
}

/// App state over a file-backed pool, for HTTP-level tests.
pub fn test_app_state() -> (AppState, tempfile::TempPath) {
    let (pool, path) = setup_test_pool();
    (
        AppState {
            db: pool,
            master_key: test_master_key(),
            events: EventSink::disabled(),
        },
        path,
    )
}

/// Router without rate limiting (oneshot requests carry no peer address).
pub fn test_app(state: AppState) -> Router {
    handlers::app(state, None)
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a future timestamp (days from now)
pub fn future_timestamp(days: i64) -> i64 {
    now() + (days * 86400)
}

/// Get a past timestamp (days ago)
pub fn past_timestamp(days: i64) -> i64 {
    now() - (days * 86400)
}

/// Collect a response body as JSON
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    use http_body_util::BodyExt;
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not valid JSON")
}
