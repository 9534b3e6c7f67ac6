use serde::{Deserialize, Serialize};

use crate::crypto::MasterKey;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStatus {
    Active,
    Inactive,
}

impl ActivationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationStatus::Active => "active",
            ActivationStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for ActivationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(ActivationStatus::Active),
            "inactive" => Ok(ActivationStatus::Inactive),
            other => Err(format!("unknown activation status: {}", other)),
        }
    }
}

/// A concrete seat grant tying a license to one instance (site, host,
/// machine). Among active rows, `(license_id, instance_type, instance_value)`
/// is unique; re-activating the same instance returns the existing row.
///
/// Device identifier and client IP are PII and stored encrypted; the raw
/// bytes are kept here and decrypted only on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activation {
    pub id: String,
    pub license_id: String,
    /// Dimension along which seats are counted (e.g. site_url, machine_id)
    pub instance_type: String,
    pub instance_value: String,
    #[serde(skip_serializing)]
    pub device_identifier_encrypted: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing)]
    pub ip_address_encrypted: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub status: ActivationStatus,
    pub activated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Activation {
    /// Decrypt the device identifier, if one was recorded.
    pub fn decrypt_device_identifier(
        &self,
        master_key: &MasterKey,
        brand_id: &str,
    ) -> Result<Option<String>> {
        match &self.device_identifier_encrypted {
            Some(encrypted) => Ok(Some(master_key.decrypt_field_string(brand_id, encrypted)?)),
            None => Ok(None),
        }
    }
}

/// Input for the activation engine.
#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub license_key: String,
    pub product_slug: String,
    pub instance_type: String,
    pub instance_value: String,
    #[serde(default)]
    pub device_identifier: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Per-instance-type seat usage computed from activation rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub max_seats: u32,
    pub used_seats: u32,
    pub remaining_seats: u32,
}

impl Entitlement {
    pub fn new(max_seats: u32, used_seats: u32) -> Self {
        Self {
            max_seats,
            used_seats,
            remaining_seats: max_seats.saturating_sub(used_seats),
        }
    }
}
