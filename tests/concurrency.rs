//! Concurrent activation safety: the seat recount inside the immediate
//! transaction must be fresh at commit time, so racing activations for the
//! last remaining seat cannot all win.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;

#[test]
fn test_one_seat_ten_racers_exactly_one_wins() {
    let (pool, _guard) = setup_test_pool();

    let (brand_id, key) = {
        let mut conn = pool.get().unwrap();
        let brand = create_test_brand(&conn, "Acme", "acme");
        let (_license, key) = provision_test_license(
            &mut conn,
            &brand.id,
            "a@example.com",
            "widget-pro",
            &[("site_url", 1)],
            LicenseType::Subscription,
            None,
        );
        (brand.id, key.unwrap())
    };

    let successes = Arc::new(AtomicUsize::new(0));
    let capacity_failures = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let pool = pool.clone();
            let brand_id = brand_id.clone();
            let key = key.clone();
            let successes = Arc::clone(&successes);
            let capacity_failures = Arc::clone(&capacity_failures);

            std::thread::spawn(move || {
                let mut conn = pool.get().expect("pool connection");
                let scope = TenantScope::brand(&brand_id);
                let result = activate_instance(
                    &mut conn,
                    &scope,
                    &key,
                    "widget-pro",
                    "site_url",
                    &format!("https://site-{}.example.com", i),
                );
                match result {
                    Ok(_) => {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(AppError::MaxActivationsReached { .. }) => {
                        capacity_failures.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(other) => panic!("unexpected activation error: {:?}", other),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("activation thread panicked");
    }

    assert_eq!(successes.load(Ordering::SeqCst), 1, "exactly one racer wins the seat");
    assert_eq!(capacity_failures.load(Ordering::SeqCst), 9);

    // Storage agrees: one active row, counter at one
    let conn = pool.get().unwrap();
    let scope = TenantScope::brand(&brand_id);
    let (licenses, _) = queries::list_licenses(&conn, &scope, 10, 0).unwrap();
    let license = &licenses[0];
    assert_eq!(
        queries::count_distinct_active_instances(&conn, &license.id, "site_url").unwrap(),
        1
    );
    assert_eq!(
        queries::get_license_by_id(&conn, &scope, &license.id)
            .unwrap()
            .unwrap()
            .current_activations,
        1
    );
}

#[test]
fn test_concurrent_reactivation_of_same_instance_stays_single_row() {
    let (pool, _guard) = setup_test_pool();

    let (brand_id, key) = {
        let mut conn = pool.get().unwrap();
        let brand = create_test_brand(&conn, "Acme", "acme");
        let (_license, key) = provision_test_license(
            &mut conn,
            &brand.id,
            "a@example.com",
            "widget-pro",
            &[("site_url", 1)],
            LicenseType::Subscription,
            None,
        );
        (brand.id, key.unwrap())
    };

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let pool = pool.clone();
            let brand_id = brand_id.clone();
            let key = key.clone();

            std::thread::spawn(move || {
                let mut conn = pool.get().expect("pool connection");
                let scope = TenantScope::brand(&brand_id);
                activate_instance(
                    &mut conn,
                    &scope,
                    &key,
                    "widget-pro",
                    "site_url",
                    "https://same.example.com",
                )
                .expect("same-instance activation never exceeds capacity")
            })
        })
        .collect();

    let activations: Vec<Activation> = handles
        .into_iter()
        .map(|h| h.join().expect("activation thread panicked"))
        .collect();

    let first_id = &activations[0].id;
    assert!(
        activations.iter().all(|a| &a.id == first_id),
        "all racers resolve to the same activation row"
    );

    let conn = pool.get().unwrap();
    let scope = TenantScope::brand(&brand_id);
    let (licenses, _) = queries::list_licenses(&conn, &scope, 10, 0).unwrap();
    let license = &licenses[0];
    assert_eq!(
        queries::count_distinct_active_instances(&conn, &license.id, "site_url").unwrap(),
        1
    );
    let rows = queries::list_activations_for_license(&conn, &scope, &license.id).unwrap();
    assert_eq!(rows.len(), 1, "idempotency race never duplicates the row");
    assert_eq!(
        queries::get_license_by_id(&conn, &scope, &license.id)
            .unwrap()
            .unwrap()
            .current_activations,
        1,
        "counter incremented exactly once"
    );
}

#[test]
fn test_deactivation_does_not_interfere_with_other_instance_types() {
    let (pool, _guard) = setup_test_pool();

    let (brand_id, key, site_activation_id) = {
        let mut conn = pool.get().unwrap();
        let brand = create_test_brand(&conn, "Acme", "acme");
        let (_license, key) = provision_test_license(
            &mut conn,
            &brand.id,
            "a@example.com",
            "widget-pro",
            &[("site_url", 1), ("machine_id", 5)],
            LicenseType::Subscription,
            None,
        );
        let key = key.unwrap();
        let scope = TenantScope::brand(&brand.id);
        let site = activate_instance(&mut conn, &scope, &key, "widget-pro", "site_url", "https://one.example.com")
            .unwrap();
        (brand.id, key, site.id)
    };

    // Deactivate the site seat while machines activate concurrently
    let deactivator = {
        let pool = pool.clone();
        let brand_id = brand_id.clone();
        std::thread::spawn(move || {
            let mut conn = pool.get().unwrap();
            let scope = TenantScope::brand(&brand_id);
            licensing::deactivate(
                &mut conn,
                &EventSink::disabled(),
                &scope,
                &site_activation_id,
                &ClientInfo::default(),
            )
            .expect("deactivate site seat");
        })
    };

    let machine_handles: Vec<_> = (0..5)
        .map(|i| {
            let pool = pool.clone();
            let brand_id = brand_id.clone();
            let key = key.clone();
            std::thread::spawn(move || {
                let mut conn = pool.get().unwrap();
                let scope = TenantScope::brand(&brand_id);
                activate_instance(
                    &mut conn,
                    &scope,
                    &key,
                    "widget-pro",
                    "machine_id",
                    &format!("hwid-{}", i),
                )
                .expect("machine activations are independent of the site seat")
            })
        })
        .collect();

    deactivator.join().unwrap();
    for handle in machine_handles {
        handle.join().unwrap();
    }

    let conn = pool.get().unwrap();
    let scope = TenantScope::brand(&brand_id);
    let (licenses, _) = queries::list_licenses(&conn, &scope, 10, 0).unwrap();
    let license = &licenses[0];
    assert_eq!(
        queries::count_distinct_active_instances(&conn, &license.id, "site_url").unwrap(),
        0
    );
    assert_eq!(
        queries::count_distinct_active_instances(&conn, &license.id, "machine_id").unwrap(),
        5
    );
}
