//! Rate limiting for the public API surface.
//!
//! Limits are applied per client IP. Credential brute force is not the
//! concern here (license keys carry 25 alphanumeric characters, API key
//! secrets 32); the tiers exist to keep polling clients and misbehaving
//! integrations from saturating the store.
//!
//! Tiers:
//! - Standard: activation, deactivation, status checks
//! - Relaxed: /health
//!
//! Configure via environment variables:
//! - RATE_LIMIT_STANDARD_RPM (default: 60)
//! - RATE_LIMIT_RELAXED_RPM (default: 120)

use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

fn create_layer(requests_per_minute: u32) -> RateLimitLayer {
    assert!(requests_per_minute > 0, "Rate limit must be greater than 0");

    let period_secs = 60 / requests_per_minute as u64;
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs.max(1)))
        .burst_size(requests_per_minute)
        .finish()
        .expect("Failed to build rate limiter config");

    GovernorLayer::new(Arc::new(config))
}

/// Standard tier for endpoints doing crypto/DB work per request.
pub fn standard_layer(requests_per_minute: u32) -> RateLimitLayer {
    create_layer(requests_per_minute)
}

/// Relaxed tier for lightweight endpoints like health checks.
pub fn relaxed_layer(requests_per_minute: u32) -> RateLimitLayer {
    create_layer(requests_per_minute)
}
