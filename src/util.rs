//! Shared helpers for header handling.

use axum::http::HeaderMap;

use crate::licensing::ClientInfo;

/// Header carrying the API key credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Extract the raw API key from the `X-API-Key` header.
///
/// Returns `None` if the header is missing, not valid ASCII, or empty.
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Extract client IP and user-agent for activation rows and domain events.
///
/// Tries `x-forwarded-for` first (proxied requests), then `x-real-ip`.
pub fn extract_client_info(headers: &HeaderMap) -> ClientInfo {
    let ip_address = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string());

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    ClientInfo {
        ip_address,
        user_agent,
    }
}
