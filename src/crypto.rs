//! Envelope encryption for sensitive fields (license key display values,
//! device identifiers, client IP addresses).
//!
//! Uses HKDF to derive per-brand data encryption keys (DEKs) from a master
//! key, then encrypts with AES-256-GCM.
//!
//! Format of encrypted data: MAGIC (4 bytes) || nonce (12 bytes) || ciphertext
//!
//! The core operates on plaintext values in memory only; encryption happens
//! at the storage boundary. The master key is rotateable: re-deriving DEKs
//! under a new master key only requires re-encrypting stored fields.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// Nonce size for AES-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Master key size (256 bits for AES-256)
const MASTER_KEY_SIZE: usize = 32;

/// Magic bytes identifying encrypted data
const ENCRYPTED_MAGIC: &[u8] = b"LCS1";

/// Holds the master encryption key for envelope encryption.
/// Per-brand DEKs are derived from it via HKDF.
#[derive(Clone)]
pub struct MasterKey {
    key: [u8; MASTER_KEY_SIZE],
}

impl MasterKey {
    /// Create a MasterKey from a base64-encoded string.
    /// The decoded key must be exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::Internal(format!("Invalid master key encoding: {}", e)))?;

        if decoded.len() != MASTER_KEY_SIZE {
            return Err(AppError::Internal(format!(
                "Master key must be {} bytes, got {}",
                MASTER_KEY_SIZE,
                decoded.len()
            )));
        }

        let mut key = [0u8; MASTER_KEY_SIZE];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }

    /// Generate a new random master key (for initial setup).
    /// Returns the key as a base64-encoded string.
    pub fn generate() -> String {
        use rand::RngCore;
        use rand::rngs::OsRng;
        let mut key = [0u8; MASTER_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Create a MasterKey from raw bytes.
    /// For production, prefer `from_base64` with a securely stored key.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive a per-brand data encryption key using HKDF.
    fn derive_dek(&self, brand_id: &str) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(Some(b"licensor-v1"), &self.key);
        let mut dek = [0u8; 32];
        // brand_id as the info parameter gives each brand a distinct DEK
        hk.expand(brand_id.as_bytes(), &mut dek)
            .expect("HKDF expand should not fail with valid length");
        dek
    }

    /// Encrypt a field value for storage.
    /// Returns: MAGIC (4 bytes) || nonce (12 bytes) || ciphertext
    pub fn encrypt_field(&self, brand_id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        use rand::RngCore;
        use rand::rngs::OsRng;

        let dek = self.derive_dek(brand_id);
        let cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| AppError::Internal(format!("Failed to create cipher: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| AppError::Internal(format!("Encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(ENCRYPTED_MAGIC.len() + NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(ENCRYPTED_MAGIC);
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt a field value from storage.
    /// Accepts: MAGIC (4 bytes) || nonce (12 bytes) || ciphertext
    pub fn decrypt_field(&self, brand_id: &str, encrypted: &[u8]) -> Result<Vec<u8>> {
        if encrypted.len() < ENCRYPTED_MAGIC.len() + NONCE_SIZE + 1 {
            return Err(AppError::Internal("Encrypted data too short".into()));
        }

        if &encrypted[..ENCRYPTED_MAGIC.len()] != ENCRYPTED_MAGIC {
            return Err(AppError::Internal(
                "Invalid encrypted data format (missing magic bytes)".into(),
            ));
        }

        let dek = self.derive_dek(brand_id);
        let cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| AppError::Internal(format!("Failed to create cipher: {}", e)))?;

        let nonce_start = ENCRYPTED_MAGIC.len();
        let nonce_end = nonce_start + NONCE_SIZE;
        let nonce = Nonce::from_slice(&encrypted[nonce_start..nonce_end]);
        let ciphertext = &encrypted[nonce_end..];

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| AppError::Internal(format!("Decryption failed: {}", e)))?;

        Ok(plaintext)
    }

    /// Decrypt a field value and interpret it as UTF-8.
    pub fn decrypt_field_string(&self, brand_id: &str, encrypted: &[u8]) -> Result<String> {
        let bytes = self.decrypt_field(brand_id, encrypted)?;
        String::from_utf8(bytes)
            .map_err(|_| AppError::Internal("Decrypted field is not valid UTF-8".into()))
    }
}

/// Hash a secret for database lookups (license keys, API keys).
/// Uses SHA-256 with an application salt, returns lowercase hex.
pub fn hash_secret(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"licensor-v1:");
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = MasterKey::from_bytes([7u8; 32]);
        let encrypted = key.encrypt_field("brand-1", b"AAAAA-BBBBB-CCCCC-DDDDD-EEEEE").unwrap();
        assert_ne!(&encrypted[4..], b"AAAAA-BBBBB-CCCCC-DDDDD-EEEEE");

        let plaintext = key.decrypt_field_string("brand-1", &encrypted).unwrap();
        assert_eq!(plaintext, "AAAAA-BBBBB-CCCCC-DDDDD-EEEEE");
    }

    #[test]
    fn decrypt_with_wrong_brand_fails() {
        let key = MasterKey::from_bytes([7u8; 32]);
        let encrypted = key.encrypt_field("brand-1", b"secret").unwrap();
        assert!(key.decrypt_field("brand-2", &encrypted).is_err());
    }

    #[test]
    fn hash_secret_is_stable_and_hex() {
        let a = hash_secret("LCSAA-BBBBB-CCCCC-DDDDD-EEEEE");
        let b = hash_secret("LCSAA-BBBBB-CCCCC-DDDDD-EEEEE");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
