use serde::{Deserialize, Serialize};

use crate::crypto::MasterKey;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseKeyStatus {
    Active,
    Inactive,
    Cancelled,
    Expired,
}

impl LicenseKeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseKeyStatus::Active => "active",
            LicenseKeyStatus::Inactive => "inactive",
            LicenseKeyStatus::Cancelled => "cancelled",
            LicenseKeyStatus::Expired => "expired",
        }
    }
}

impl std::str::FromStr for LicenseKeyStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(LicenseKeyStatus::Active),
            "inactive" => Ok(LicenseKeyStatus::Inactive),
            "cancelled" => Ok(LicenseKeyStatus::Cancelled),
            "expired" => Ok(LicenseKeyStatus::Expired),
            other => Err(format!("unknown license key status: {}", other)),
        }
    }
}

/// Customer-level credential unlocking one or more per-product licenses.
///
/// The key itself is stored twice: a SHA-256 hash for lookups and the
/// encrypted display value so brand admins can re-surface it to customers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseKey {
    pub id: String,
    pub brand_id: String,
    pub customer_email: String,
    /// Encrypted display value of the key (decrypt with [`LicenseKey::decrypt_key`])
    #[serde(skip_serializing)]
    pub key_encrypted: Vec<u8>,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub status: LicenseKeyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl LicenseKey {
    /// A license key is usable when active and not past its expiry.
    pub fn is_valid(&self, now: i64) -> bool {
        self.status == LicenseKeyStatus::Active && self.expires_at.is_none_or(|exp| exp > now)
    }

    /// Decrypt the display value of the key.
    pub fn decrypt_key(&self, master_key: &MasterKey) -> Result<String> {
        master_key.decrypt_field_string(&self.brand_id, &self.key_encrypted)
    }
}
