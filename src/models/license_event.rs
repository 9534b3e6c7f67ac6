use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseEventType {
    Created,
    Updated,
    Activated,
    Deactivated,
    Suspended,
    Resumed,
    Renewed,
    Cancelled,
    Expired,
    KeyGenerated,
    KeyCancelled,
}

impl LicenseEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseEventType::Created => "created",
            LicenseEventType::Updated => "updated",
            LicenseEventType::Activated => "activated",
            LicenseEventType::Deactivated => "deactivated",
            LicenseEventType::Suspended => "suspended",
            LicenseEventType::Resumed => "resumed",
            LicenseEventType::Renewed => "renewed",
            LicenseEventType::Cancelled => "cancelled",
            LicenseEventType::Expired => "expired",
            LicenseEventType::KeyGenerated => "key_generated",
            LicenseEventType::KeyCancelled => "key_cancelled",
        }
    }
}

impl std::str::FromStr for LicenseEventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(LicenseEventType::Created),
            "updated" => Ok(LicenseEventType::Updated),
            "activated" => Ok(LicenseEventType::Activated),
            "deactivated" => Ok(LicenseEventType::Deactivated),
            "suspended" => Ok(LicenseEventType::Suspended),
            "resumed" => Ok(LicenseEventType::Resumed),
            "renewed" => Ok(LicenseEventType::Renewed),
            "cancelled" => Ok(LicenseEventType::Cancelled),
            "expired" => Ok(LicenseEventType::Expired),
            "key_generated" => Ok(LicenseEventType::KeyGenerated),
            "key_cancelled" => Ok(LicenseEventType::KeyCancelled),
            other => Err(format!("unknown license event type: {}", other)),
        }
    }
}

/// Append-only audit record of a license lifecycle transition or activation
/// state change. Written by the event sink, decoupled from the engine's
/// transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseEvent {
    pub id: String,
    pub license_id: String,
    pub event_type: LicenseEventType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub created_at: i64,
}

/// A domain event handed to the [`crate::events::EventSink`].
#[derive(Debug, Clone)]
pub struct NewLicenseEvent {
    pub license_id: String,
    pub event_type: LicenseEventType,
    pub description: String,
    pub event_data: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewLicenseEvent {
    pub fn new(
        license_id: impl Into<String>,
        event_type: LicenseEventType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            license_id: license_id.into(),
            event_type,
            description: description.into(),
            event_data: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.event_data = Some(data);
        self
    }

    pub fn with_client(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip;
        self.user_agent = user_agent;
        self
    }
}
