//! Credential encryption contract (spec.md §6).
//!
//! Stored account passwords may be plaintext or ciphertext. Ciphertext is
//! `base64(salt(16B) || nonce(12B) || AEAD_ciphertext)`, keyed by
//! PBKDF2-HMAC-SHA256 (100k iterations, 32-byte output) over the
//! configured master key. Detection: a value decodes as base64 and has
//! length >= 28 bytes decoded; otherwise it is treated as plaintext.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const PBKDF2_ITERATIONS: u32 = 100_000;
const MIN_CIPHERTEXT_LEN: usize = 28;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("master key must be at least 32 characters")]
    WeakMasterKey,
    #[error("ciphertext is malformed")]
    Malformed,
    #[error("decryption failed")]
    DecryptionFailed,
}

/// Encrypts and decrypts account credentials against a single master
/// key, constructed once by the root container (spec.md §9: "Singleton
/// encryption ... instances become explicit dependency injection").
#[derive(Clone)]
pub struct CredentialCodec {
    master_key: String,
}

impl CredentialCodec {
    pub fn new(master_key: impl Into<String>) -> Result<Self, CredentialError> {
        let master_key = master_key.into();
        if master_key.len() < 32 {
            return Err(CredentialError::WeakMasterKey);
        }
        Ok(Self { master_key })
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; 32] {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(self.master_key.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
        key
    }

    /// `true` if the stored value looks like our ciphertext encoding
    /// rather than a plaintext password, per the §6 detection rule.
    pub fn looks_encrypted(value: &str) -> bool {
        match STANDARD.decode(value) {
            Ok(bytes) => bytes.len() >= MIN_CIPHERTEXT_LEN,
            Err(_) => false,
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CredentialError::Malformed)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CredentialError::DecryptionFailed)?;

        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt_if_needed(&self, stored: &str) -> Result<String, CredentialError> {
        if !Self::looks_encrypted(stored) {
            return Ok(stored.to_string());
        }
        let bytes = STANDARD.decode(stored).map_err(|_| CredentialError::Malformed)?;
        if bytes.len() < SALT_LEN + NONCE_LEN {
            return Err(CredentialError::Malformed);
        }
        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CredentialError::Malformed)?;
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CredentialError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| CredentialError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CredentialCodec {
        CredentialCodec::new("a".repeat(32)).unwrap()
    }

    #[test]
    fn round_trips_through_encrypt_and_decrypt() {
        let codec = codec();
        let ciphertext = codec.encrypt("hunter2").unwrap();
        assert!(CredentialCodec::looks_encrypted(&ciphertext));
        assert_eq!(codec.decrypt_if_needed(&ciphertext).unwrap(), "hunter2");
    }

    #[test]
    fn plaintext_passes_through_unchanged() {
        let codec = codec();
        assert_eq!(codec.decrypt_if_needed("hunter2").unwrap(), "hunter2");
    }

    #[test]
    fn rejects_short_master_key() {
        assert!(CredentialCodec::new("too-short").is_err());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let a = CredentialCodec::new("a".repeat(32)).unwrap();
        let b = CredentialCodec::new("b".repeat(32)).unwrap();
        let ciphertext = a.encrypt("hunter2").unwrap();
        assert!(b.decrypt_if_needed(&ciphertext).is_err());
    }
}
