use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Suspended,
    Cancelled,
    Expired,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Suspended => "suspended",
            LicenseStatus::Cancelled => "cancelled",
            LicenseStatus::Expired => "expired",
        }
    }
}

impl std::str::FromStr for LicenseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(LicenseStatus::Active),
            "suspended" => Ok(LicenseStatus::Suspended),
            "cancelled" => Ok(LicenseStatus::Cancelled),
            "expired" => Ok(LicenseStatus::Expired),
            other => Err(format!("unknown license status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    Perpetual,
    Subscription,
    Trial,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseType::Perpetual => "perpetual",
            LicenseType::Subscription => "subscription",
            LicenseType::Trial => "trial",
        }
    }
}

impl std::str::FromStr for LicenseType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "perpetual" => Ok(LicenseType::Perpetual),
            "subscription" => Ok(LicenseType::Subscription),
            "trial" => Ok(LicenseType::Trial),
            other => Err(format!("unknown license type: {}", other)),
        }
    }
}

/// Per-instance-type seat limits, e.g. `{"site_url": 3, "machine_id": 1}`.
///
/// An instance type absent from the map is unsupported for the license -
/// surfaced as an error by the engine, not as zero capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationLimits(BTreeMap<String, u32>);

impl ActivationLimits {
    pub fn new(limits: BTreeMap<String, u32>) -> Self {
        Self(limits)
    }

    /// Seat limit for an instance type; `None` when the type is unsupported.
    pub fn limit_for(&self, instance_type: &str) -> Option<u32> {
        self.0.get(instance_type).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate limits on write: at least one instance type, every limit a
    /// positive integer.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(AppError::BadRequest(
                "max_activations_per_instance must configure at least one instance type".into(),
            ));
        }
        for (instance_type, max) in &self.0 {
            if *max == 0 {
                return Err(AppError::BadRequest(format!(
                    "max_activations_per_instance.{} must be a positive integer",
                    instance_type
                )));
            }
        }
        Ok(())
    }

    /// Serialize for the JSON column.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Parse from the JSON column.
    pub fn from_json(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// One product's entitlement terms for one customer under one brand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub license_key_id: String,
    pub brand_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub product_name: String,
    pub product_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_sku: Option<String>,
    pub license_type: LicenseType,
    pub max_activations_per_instance: ActivationLimits,
    /// Denormalized running count, advisory only. The authoritative per-type
    /// usage is computed live from activation rows.
    pub current_activations: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub status: LicenseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl License {
    /// Whether the license has passed its expiry. Perpetual licenses never
    /// expire, regardless of `expires_at`.
    pub fn is_expired(&self, now: i64) -> bool {
        if self.license_type == LicenseType::Perpetual {
            return false;
        }
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Basic activation gate: active status and not expired. Per-type seat
    /// limits are enforced by the activation engine.
    pub fn can_activate(&self, now: i64) -> bool {
        self.status == LicenseStatus::Active && !self.is_expired(now)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLicense {
    pub customer_email: String,
    pub customer_name: String,
    pub product_name: String,
    pub product_slug: String,
    #[serde(default)]
    pub product_sku: Option<String>,
    pub license_type: LicenseType,
    pub max_activations_per_instance: ActivationLimits,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}
