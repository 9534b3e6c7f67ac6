mod activations;
mod api_keys;
mod license_keys;
mod licenses;

pub use activations::*;
pub use api_keys::*;
pub use license_keys::*;
pub use licenses::*;

use axum::{Json, Router, middleware::from_fn_with_state, routing::get};
use serde::{Deserialize, Serialize};

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::middleware::api_key_auth;
use crate::rate_limit;

/// Permission scope required to activate/deactivate and poll status.
pub const SCOPE_LICENSE_ACTIVATE: &str = "license:activate";
/// Permission scope required for provisioning and lifecycle changes.
pub const SCOPE_LICENSE_MANAGE: &str = "license:manage";
/// Permission scope required to manage API keys.
pub const SCOPE_API_KEYS_MANAGE: &str = "api-keys:manage";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Common pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    15
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit()
    }
}

/// Build the application router.
///
/// Rate limiting requires peer address info from the listener, so tests
/// pass `None` and drive routes with `oneshot` directly.
pub fn app(state: AppState, rate_limit_config: Option<RateLimitConfig>) -> Router {
    let mut api = Router::new()
        .merge(activations::router())
        .merge(licenses::router())
        .merge(license_keys::router())
        .merge(api_keys::router())
        .layer(from_fn_with_state(state.clone(), api_key_auth));

    let mut health_route = Router::new().route("/health", get(health));

    if let Some(limits) = rate_limit_config {
        api = api.layer(rate_limit::standard_layer(limits.standard_rpm));
        health_route = health_route.layer(rate_limit::relaxed_layer(limits.relaxed_rpm));
    }

    Router::new()
        .nest("/api/v1", api)
        .merge(health_route)
        .layer(axum::middleware::from_fn(crate::middleware::request_id))
        .with_state(state)
}
