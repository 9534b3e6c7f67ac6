use serde::{Deserialize, Serialize};

/// API key credential for a brand.
///
/// Only the hash of the full credential is stored; `prefix` is the short
/// non-secret token used for indexed lookup. An empty permission set grants
/// full access; `"*"` is the wildcard permission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub brand_id: String,
    pub name: String,
    pub prefix: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl ApiKey {
    /// An API key is usable when it is active, not soft-deleted, and not
    /// past its expiry.
    pub fn is_valid(&self, now: i64) -> bool {
        self.is_active
            && self.deleted_at.is_none()
            && self.expires_at.is_none_or(|exp| exp > now)
    }

    /// Check whether this key satisfies the given required permissions.
    ///
    /// An empty permission set means full access. Otherwise the key must
    /// carry the wildcard or every required permission.
    pub fn allows(&self, required: &[&str]) -> bool {
        if self.permissions.is_empty() {
            return true;
        }
        if self.permissions.iter().any(|p| p == "*") {
            return true;
        }
        required
            .iter()
            .all(|scope| self.permissions.iter().any(|p| p == scope))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKey {
    pub name: String,
    /// Permission scopes; omitted or empty = full access
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    /// Optional expiration in days from now
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

/// Response when creating or rotating an API key.
/// Includes the full plaintext credential, shown exactly once.
#[derive(Debug, Serialize)]
pub struct ApiKeyCreated {
    pub id: String,
    pub name: String,
    /// Full API key - only returned at creation/rotation
    pub key: String,
    pub prefix: String,
    pub permissions: Vec<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(permissions: Vec<&str>) -> ApiKey {
        ApiKey {
            id: "k-1".into(),
            brand_id: "b-1".into(),
            name: "test".into(),
            prefix: "lcs_abcd1234".into(),
            key_hash: "hash".into(),
            permissions: permissions.into_iter().map(String::from).collect(),
            last_used_at: None,
            expires_at: None,
            is_active: true,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        }
    }

    #[test]
    fn empty_permissions_grant_full_access() {
        assert!(key(vec![]).allows(&["license:activate"]));
    }

    #[test]
    fn wildcard_grants_everything() {
        assert!(key(vec!["*"]).allows(&["license:activate", "license:manage"]));
    }

    #[test]
    fn all_required_scopes_must_be_present() {
        let k = key(vec!["license:activate"]);
        assert!(k.allows(&["license:activate"]));
        assert!(!k.allows(&["license:manage"]));
        assert!(!k.allows(&["license:activate", "license:manage"]));
    }

    #[test]
    fn expired_or_inactive_key_is_invalid() {
        let mut k = key(vec![]);
        assert!(k.is_valid(1000));

        k.expires_at = Some(999);
        assert!(!k.is_valid(1000));

        k.expires_at = Some(2000);
        k.is_active = false;
        assert!(!k.is_valid(1000));
    }
}
