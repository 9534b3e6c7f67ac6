//! Credential generation for license keys and API keys.
//!
//! Both credential families share the same shape: a short non-secret token
//! used for indexed lookup, and a long random token proving possession.
//! Only the SHA-256 hash of a credential is persisted; the plaintext is
//! returned to the caller exactly once and then discarded.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rusqlite::Connection;

use crate::crypto::hash_secret;
use crate::error::Result;

/// Number of character groups in a license key.
const LICENSE_KEY_GROUPS: usize = 5;

/// Characters per license key group.
const LICENSE_KEY_GROUP_LEN: usize = 5;

/// Prefix marking Licensor API keys.
pub const API_KEY_PREFIX_TAG: &str = "lcs_";

/// Random characters in an API key prefix (after the `lcs_` tag).
const API_KEY_PREFIX_LEN: usize = 8;

/// Random characters in an API key secret.
const API_KEY_SECRET_LEN: usize = 32;

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a license key in `XXXXX-XXXXX-XXXXX-XXXXX-XXXXX` format:
/// 25 random alphanumeric characters, uppercased and dash-grouped by 5.
pub fn generate_license_key() -> String {
    let raw = random_alphanumeric(LICENSE_KEY_GROUPS * LICENSE_KEY_GROUP_LEN).to_uppercase();
    raw.as_bytes()
        .chunks(LICENSE_KEY_GROUP_LEN)
        .map(|chunk| std::str::from_utf8(chunk).expect("alphanumeric chunks are valid UTF-8"))
        .collect::<Vec<_>>()
        .join("-")
}

/// Generate a license key whose hash does not collide with any stored key.
///
/// Collision probability is negligible (25 alphanumeric characters) but is
/// handled by regeneration rather than assumed away. Returns the plaintext
/// key and its storage hash.
pub fn unique_license_key(conn: &Connection) -> Result<(String, String)> {
    loop {
        let key = generate_license_key();
        let key_hash = hash_secret(&key);
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM license_keys WHERE key_hash = ?1",
                rusqlite::params![&key_hash],
                |_| Ok(true),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(other),
            })?;
        if !exists {
            return Ok((key, key_hash));
        }
    }
}

/// Generate an API key in `lcs_<8 chars>.<32 chars>` format.
///
/// Returns `(plaintext, prefix)`. The prefix (everything before the dot,
/// including the `lcs_` tag) is stored in clear for indexed lookup; only the
/// hash of the full credential is persisted.
pub fn generate_api_key() -> (String, String) {
    let prefix = format!(
        "{}{}",
        API_KEY_PREFIX_TAG,
        random_alphanumeric(API_KEY_PREFIX_LEN)
    );
    let secret = random_alphanumeric(API_KEY_SECRET_LEN);
    (format!("{}.{}", prefix, secret), prefix)
}

/// Split a raw API key credential into its prefix part.
///
/// Returns `None` when the credential is not in `prefix.secret` shape or the
/// prefix does not carry the `lcs_` tag.
pub fn extract_api_key_prefix(raw: &str) -> Option<&str> {
    let (prefix, secret) = raw.split_once('.')?;
    if !prefix.starts_with(API_KEY_PREFIX_TAG) || secret.is_empty() {
        return None;
    }
    Some(prefix)
}
