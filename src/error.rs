use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Application error type.
///
/// Domain variants carry a stable machine-readable code (see [`AppError::code`])
/// so HTTP status mapping and client handling stay decoupled from messages.
/// Infrastructure variants surface as a generic internal error; full context
/// is logged at the boundary, never leaked to the caller.
#[derive(Error, Debug)]
pub enum AppError {
    // -- license credential / entitlement --
    #[error("License key not found")]
    LicenseKeyInvalid,

    #[error("License key is not usable")]
    LicenseKeyNotUsable,

    #[error("No license found for product: {0}")]
    LicenseNotFoundForProduct(String),

    #[error("License cannot be activated: {0}")]
    LicenseCannotActivate(String),

    #[error("Instance type is not configured for this license: {0}")]
    InstanceTypeNotConfigured(String),

    #[error("Maximum activations reached for {instance_type} ({max})")]
    MaxActivationsReached { instance_type: String, max: u32 },

    #[error("Activation not found")]
    ActivationNotFound,

    // -- API key authentication / authorization --
    #[error("API key is required. Provide it in the X-API-Key header")]
    ApiKeyMissing,

    #[error("Invalid API key format")]
    ApiKeyMalformed,

    #[error("Invalid API key")]
    ApiKeyInvalid,

    #[error("API key is inactive or expired")]
    ApiKeyNotUsable,

    #[error("Associated brand is inactive")]
    BrandInactive,

    #[error("API key does not have the required permissions")]
    InsufficientPermissions,

    // -- generic request-shape errors --
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // -- infrastructure --
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable error code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::LicenseKeyInvalid => "LICENSE_KEY_INVALID",
            AppError::LicenseKeyNotUsable => "LICENSE_KEY_NOT_VALID",
            AppError::LicenseNotFoundForProduct(_) => "LICENSE_NOT_FOUND_FOR_PRODUCT",
            AppError::LicenseCannotActivate(_) => "LICENSE_CANNOT_ACTIVATE",
            AppError::InstanceTypeNotConfigured(_) => "INSTANCE_TYPE_NOT_CONFIGURED",
            AppError::MaxActivationsReached { .. } => "MAX_ACTIVATIONS_REACHED",
            AppError::ActivationNotFound => "ACTIVATION_NOT_FOUND",
            AppError::ApiKeyMissing => "API_KEY_MISSING",
            AppError::ApiKeyMalformed => "API_KEY_MALFORMED",
            AppError::ApiKeyInvalid => "API_KEY_INVALID",
            AppError::ApiKeyNotUsable => "API_KEY_NOT_USABLE",
            AppError::BrandInactive => "BRAND_INACTIVE",
            AppError::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Json(_) => "INVALID_JSON",
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::LicenseKeyInvalid
            | AppError::LicenseNotFoundForProduct(_)
            | AppError::ActivationNotFound
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::LicenseKeyNotUsable
            | AppError::LicenseCannotActivate(_)
            | AppError::BrandInactive
            | AppError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AppError::InstanceTypeNotConfigured(_)
            | AppError::BadRequest(_)
            | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::MaxActivationsReached { .. } | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ApiKeyMissing
            | AppError::ApiKeyMalformed
            | AppError::ApiKeyInvalid
            | AppError::ApiKeyNotUsable => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                None
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                None
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                None
            }
            other => Some(other.to_string()),
        };

        let body = ErrorResponse {
            error: self.code(),
            message,
        };

        (self.status(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
