use rusqlite::Connection;

/// Initialize the database schema.
///
/// WAL + busy_timeout so concurrent immediate transactions queue on the
/// write lock instead of failing. The partial unique index on activations
/// backs the idempotency guarantee at the storage level: among active rows,
/// (license_id, instance_type, instance_value) is unique.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;

        -- Brands (tenants). Soft delete: deleted_at = tombstone time, NULL = live.
        CREATE TABLE IF NOT EXISTS brands (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            contact_email TEXT,
            website TEXT,
            settings TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_brands_slug ON brands(slug);
        CREATE INDEX IF NOT EXISTS idx_brands_live ON brands(id) WHERE deleted_at IS NULL;

        -- API keys. prefix is non-secret and indexed for lookup;
        -- key_hash is the SHA-256 of the full credential.
        CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            brand_id TEXT NOT NULL REFERENCES brands(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            prefix TEXT NOT NULL,
            key_hash TEXT NOT NULL UNIQUE,
            permissions TEXT,
            last_used_at INTEGER,
            expires_at INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_api_keys_prefix ON api_keys(prefix);
        CREATE INDEX IF NOT EXISTS idx_api_keys_brand ON api_keys(brand_id, is_active);

        -- License keys (customer-level credentials).
        -- key: encrypted display value; key_hash: SHA-256 lookup key.
        CREATE TABLE IF NOT EXISTS license_keys (
            id TEXT PRIMARY KEY,
            brand_id TEXT NOT NULL REFERENCES brands(id) ON DELETE CASCADE,
            customer_email TEXT NOT NULL,
            key BLOB NOT NULL,
            key_hash TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'inactive', 'cancelled', 'expired')),
            expires_at INTEGER,
            metadata TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_license_keys_brand_customer
            ON license_keys(brand_id, customer_email);
        CREATE INDEX IF NOT EXISTS idx_license_keys_status ON license_keys(status);

        -- Licenses (one product entitlement per customer per brand).
        -- max_activations_per_instance: JSON map instance_type -> positive int.
        -- current_activations: denormalized running count, advisory only.
        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            license_key_id TEXT NOT NULL REFERENCES license_keys(id) ON DELETE CASCADE,
            brand_id TEXT NOT NULL REFERENCES brands(id) ON DELETE CASCADE,
            customer_email TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            product_name TEXT NOT NULL,
            product_slug TEXT NOT NULL,
            product_sku TEXT,
            license_type TEXT NOT NULL DEFAULT 'subscription'
                CHECK (license_type IN ('perpetual', 'subscription', 'trial')),
            max_activations_per_instance TEXT NOT NULL,
            current_activations INTEGER NOT NULL DEFAULT 0,
            expires_at INTEGER,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'suspended', 'cancelled', 'expired')),
            metadata TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_key ON licenses(license_key_id);
        CREATE INDEX IF NOT EXISTS idx_licenses_brand_customer
            ON licenses(brand_id, customer_email);
        CREATE INDEX IF NOT EXISTS idx_licenses_status ON licenses(status);
        CREATE INDEX IF NOT EXISTS idx_licenses_expires ON licenses(expires_at);

        -- Activations (seat grants). No brand_id column: tenant scoping
        -- traverses the owning license.
        CREATE TABLE IF NOT EXISTS activations (
            id TEXT PRIMARY KEY,
            license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
            instance_type TEXT NOT NULL,
            instance_value TEXT NOT NULL,
            device_identifier BLOB,
            device_name TEXT,
            ip_address BLOB,
            user_agent TEXT,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'inactive')),
            activated_at INTEGER NOT NULL,
            deactivated_at INTEGER,
            last_checked_at INTEGER,
            metadata TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_activations_active_instance
            ON activations(license_id, instance_type, instance_value)
            WHERE status = 'active';
        CREATE INDEX IF NOT EXISTS idx_activations_license_status
            ON activations(license_id, status);

        -- License events (append-only, written by the event sink).
        CREATE TABLE IF NOT EXISTS license_events (
            id TEXT PRIMARY KEY,
            license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
            event_type TEXT NOT NULL,
            description TEXT NOT NULL,
            event_data TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_license_events_license
            ON license_events(license_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_license_events_type ON license_events(event_type);
        "#,
    )?;
    Ok(())
}
