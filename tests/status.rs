//! Status checks are a polling surface: every license problem is data in a
//! structured result, never an error.

mod common;

use common::*;

fn setup() -> (rusqlite::Connection, Brand, TenantScope) {
    let conn = setup_test_db();
    let brand = create_test_brand(&conn, "Acme", "acme");
    let scope = TenantScope::brand(&brand.id);
    (conn, brand, scope)
}

#[test]
fn test_unknown_key_is_structured_invalid() {
    let (conn, _brand, scope) = setup();
    let status =
        licensing::check_status(&conn, &scope, "AAAAA-BBBBB-CCCCC-DDDDD-EEEEE", "widget-pro")
            .expect("status checks never throw for license problems");
    assert!(!status.valid);
    assert_eq!(status.reason.as_deref(), Some("Invalid license key"));
    assert!(status.entitlements.is_none());
}

#[test]
fn test_cancelled_key_is_invalid() {
    let (mut conn, brand, scope) = setup();
    let (license, key) = provision_test_license(
        &mut conn,
        &brand.id,
        "a@example.com",
        "widget-pro",
        &[("site_url", 2)],
        LicenseType::Subscription,
        None,
    );
    let key = key.unwrap();
    queries::cancel_license_key(&conn, &scope, &license.license_key_id).unwrap();

    let status = licensing::check_status(&conn, &scope, &key, "widget-pro").unwrap();
    assert!(!status.valid);
    assert_eq!(status.reason.as_deref(), Some("License key is not usable"));
}

#[test]
fn test_missing_product_is_invalid() {
    let (mut conn, brand, scope) = setup();
    let (_license, key) = provision_test_license(
        &mut conn,
        &brand.id,
        "a@example.com",
        "widget-pro",
        &[("site_url", 2)],
        LicenseType::Subscription,
        None,
    );
    let key = key.unwrap();

    let status = licensing::check_status(&conn, &scope, &key, "other-product").unwrap();
    assert!(!status.valid);
    assert_eq!(
        status.reason.as_deref(),
        Some("License not found for this product")
    );
}

#[test]
fn test_expired_license_reports_expiry() {
    let (mut conn, brand, scope) = setup();
    let expires_at = past_timestamp(3);
    let (_license, key) = provision_test_license(
        &mut conn,
        &brand.id,
        "a@example.com",
        "widget-pro",
        &[("site_url", 2)],
        LicenseType::Subscription,
        Some(expires_at),
    );
    let key = key.unwrap();

    let status = licensing::check_status(&conn, &scope, &key, "widget-pro").unwrap();
    assert!(!status.valid);
    assert_eq!(status.reason.as_deref(), Some("License has expired"));
    assert_eq!(status.expires_at, Some(expires_at));
}

#[test]
fn test_suspended_license_reports_status() {
    let (mut conn, brand, scope) = setup();
    let (license, key) = provision_test_license(
        &mut conn,
        &brand.id,
        "a@example.com",
        "widget-pro",
        &[("site_url", 2)],
        LicenseType::Subscription,
        None,
    );
    let key = key.unwrap();
    queries::set_license_status(&conn, &scope, &license.id, LicenseStatus::Suspended).unwrap();

    let status = licensing::check_status(&conn, &scope, &key, "widget-pro").unwrap();
    assert!(!status.valid);
    assert_eq!(status.reason.as_deref(), Some("License is not active"));
    assert_eq!(status.status, Some(LicenseStatus::Suspended));
}

#[test]
fn test_valid_license_reports_entitlements() {
    let (mut conn, brand, scope) = setup();
    let (_license, key) = provision_test_license(
        &mut conn,
        &brand.id,
        "a@example.com",
        "widget-pro",
        &[("site_url", 3), ("machine_id", 1)],
        LicenseType::Subscription,
        Some(future_timestamp(30)),
    );
    let key = key.unwrap();

    activate_instance(&mut conn, &scope, &key, "widget-pro", "site_url", "https://one.example.com")
        .unwrap();
    activate_instance(&mut conn, &scope, &key, "widget-pro", "site_url", "https://two.example.com")
        .unwrap();

    let status = licensing::check_status(&conn, &scope, &key, "widget-pro").unwrap();
    assert!(status.valid);
    assert!(status.reason.is_none());
    assert_eq!(status.license_type, Some(LicenseType::Subscription));
    assert_eq!(status.product_slug.as_deref(), Some("widget-pro"));

    let entitlements = status.entitlements.expect("valid result carries entitlements");
    let site = &entitlements["site_url"];
    assert_eq!(site.max_seats, 3);
    assert_eq!(site.used_seats, 2);
    assert_eq!(site.remaining_seats, 1);
    let machine = &entitlements["machine_id"];
    assert_eq!(machine.max_seats, 1);
    assert_eq!(machine.used_seats, 0);
    assert_eq!(machine.remaining_seats, 1);
}

#[test]
fn test_status_check_does_not_consume_seats() {
    let (mut conn, brand, scope) = setup();
    let (license, key) = provision_test_license(
        &mut conn,
        &brand.id,
        "a@example.com",
        "widget-pro",
        &[("site_url", 1)],
        LicenseType::Subscription,
        None,
    );
    let key = key.unwrap();

    for _ in 0..5 {
        licensing::check_status(&conn, &scope, &key, "widget-pro").unwrap();
    }
    assert_eq!(
        queries::count_distinct_active_instances(&conn, &license.id, "site_url").unwrap(),
        0
    );
}
