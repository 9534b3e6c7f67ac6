//! API key authentication and authorization over the HTTP surface.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use tower::ServiceExt;

fn check_body(license_key: &str) -> Body {
    Body::from(
        serde_json::json!({
            "license_key": license_key,
            "product_slug": "widget-pro",
        })
        .to_string(),
    )
}

fn check_request(api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/activations/check")
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder
        .body(check_body("AAAAA-BBBBB-CCCCC-DDDDD-EEEEE"))
        .unwrap()
}

/// App with one brand and one unrestricted API key.
async fn seeded_app() -> (axum::Router, String, AppState, tempfile::TempPath) {
    let (state, guard) = test_app_state();
    let api_key = {
        let conn = state.db.get().unwrap();
        let brand = create_test_brand(&conn, "Acme", "acme");
        let (_, key) = create_test_api_key(&conn, &brand.id, None);
        key
    };
    (test_app(state.clone()), api_key, state, guard)
}

#[tokio::test]
async fn missing_api_key_returns_401() {
    let (app, _key, _state, _guard) = seeded_app().await;

    let response = app.oneshot(check_request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "API_KEY_MISSING");
}

#[tokio::test]
async fn malformed_api_key_returns_401() {
    let (app, _key, _state, _guard) = seeded_app().await;

    // No dot separator
    let response = app
        .clone()
        .oneshot(check_request(Some("lcs_notakeyatall")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "API_KEY_MALFORMED");

    // Wrong family tag
    let response = app
        .oneshot(check_request(Some("sk_abc12345.0123456789abcdef")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_prefix_returns_401() {
    let (app, _key, _state, _guard) = seeded_app().await;

    let response = app
        .oneshot(check_request(Some("lcs_zzzzzzzz.0123456789abcdef0123456789abcdef")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "API_KEY_INVALID");
}

#[tokio::test]
async fn wrong_secret_with_known_prefix_returns_401() {
    let (app, key, _state, _guard) = seeded_app().await;

    let prefix = key.split_once('.').unwrap().0;
    let forged = format!("{}.{}", prefix, "0123456789abcdef0123456789abcdef");
    let response = app.oneshot(check_request(Some(&forged))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "API_KEY_INVALID");
}

#[tokio::test]
async fn expired_api_key_returns_401() {
    let (state, _guard) = test_app_state();
    let key = {
        let conn = state.db.get().unwrap();
        let brand = create_test_brand(&conn, "Acme", "acme");
        let input = CreateApiKey {
            name: "expired".to_string(),
            permissions: None,
            expires_in_days: Some(-1),
        };
        let (_, key) = queries::create_api_key(&conn, &brand.id, &input).unwrap();
        key
    };
    let app = test_app(state);

    let response = app.oneshot(check_request(Some(&key))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "API_KEY_NOT_USABLE");
}

#[tokio::test]
async fn revoked_api_key_stops_authenticating() {
    let (app, key, state, _guard) = seeded_app().await;

    {
        let conn = state.db.get().unwrap();
        let keys = queries::list_api_keys(&conn, &TenantScope::All).unwrap();
        queries::revoke_api_key(&conn, &TenantScope::All, &keys[0].id).unwrap();
    }

    let response = app.oneshot(check_request(Some(&key))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn inactive_brand_returns_403() {
    let (app, key, state, _guard) = seeded_app().await;

    {
        let conn = state.db.get().unwrap();
        conn.execute("UPDATE brands SET is_active = 0", []).unwrap();
    }

    let response = app.oneshot(check_request(Some(&key))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "BRAND_INACTIVE");
}

#[tokio::test]
async fn insufficient_scope_is_403_not_401() {
    let (state, _guard) = test_app_state();
    let key = {
        let conn = state.db.get().unwrap();
        let brand = create_test_brand(&conn, "Acme", "acme");
        // Key can manage licenses but not activate them
        let (_, key) =
            create_test_api_key(&conn, &brand.id, Some(vec!["license:manage".to_string()]));
        key
    };
    let app = test_app(state);

    let response = app.oneshot(check_request(Some(&key))).await.unwrap();
    assert_eq!(
        response.status(),
        StatusCode::FORBIDDEN,
        "authentication succeeded; authorization failed"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], "INSUFFICIENT_PERMISSIONS");
}

#[tokio::test]
async fn wildcard_and_exact_scopes_authorize() {
    for permissions in [
        None,
        Some(vec!["*".to_string()]),
        Some(vec!["license:activate".to_string()]),
    ] {
        let (state, _guard) = test_app_state();
        let key = {
            let conn = state.db.get().unwrap();
            let brand = create_test_brand(&conn, "Acme", "acme");
            let (_, key) = create_test_api_key(&conn, &brand.id, permissions.clone());
            key
        };
        let app = test_app(state);

        let response = app.oneshot(check_request(Some(&key))).await.unwrap();
        assert_eq!(
            response.status(),
            StatusCode::OK,
            "permissions {:?} should authorize the check endpoint",
            permissions
        );
        // Unknown license key is data on this surface, never an auth error
        let body = body_json(response).await;
        assert_eq!(body["valid"], false);
    }
}

#[tokio::test]
async fn last_used_is_stamped_best_effort() {
    let (app, key, state, _guard) = seeded_app().await;

    let response = app.oneshot(check_request(Some(&key))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The stamp happens off the request path; give it a moment
    let mut stamped = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let conn = state.db.get().unwrap();
        let keys = queries::list_api_keys(&conn, &TenantScope::All).unwrap();
        if keys[0].last_used_at.is_some() {
            stamped = true;
            break;
        }
    }
    assert!(stamped, "last_used_at should be recorded shortly after the request");
}

#[tokio::test]
async fn health_needs_no_auth() {
    let (app, _key, _state, _guard) = seeded_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn request_id_is_echoed_and_generated() {
    let (app, _key, _state, _guard) = seeded_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .header("x-request-id", "corr-1234")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "corr-1234",
        "caller-supplied correlation id is echoed"
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let generated = response
        .headers()
        .get("x-request-id")
        .expect("generated correlation id");
    assert!(!generated.to_str().unwrap().is_empty());
}
