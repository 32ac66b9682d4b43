//! Credential Vault
//!
//! At-rest encryption for the e-governance portal password. SQLite does
//! not natively encrypt, so the sensitive column is stored as
//! XChaCha20-Poly1305 ciphertext, base64-encoded with the nonce prepended.
//! The vault key is derived from a server-side secret and never leaves the
//! process.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use sha2::{Digest, Sha256};

use crate::errors::AuthError;

/// Length of the XChaCha20-Poly1305 nonce carried with each ciphertext.
const NONCE_LEN: usize = 24;

/// Symmetric vault for sensitive credential columns.
pub struct Vault {
    cipher: XChaCha20Poly1305,
}

impl Vault {
    /// Derive the vault key from a server-side secret.
    #[must_use]
    pub fn derive(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::from_slice(digest.as_slice());
        Self {
            cipher: XChaCha20Poly1305::new(key),
        }
    }

    /// Encrypt a plaintext credential for storage.
    ///
    /// Returns `base64(nonce || ciphertext)` with a fresh random nonce.
    pub fn seal(&self, plaintext: &str) -> Result<String, AuthError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| AuthError::Vault(format!("encrypt failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Decrypt a stored credential.
    pub fn open(&self, sealed: &str) -> Result<String, AuthError> {
        let bytes = BASE64
            .decode(sealed)
            .map_err(|e| AuthError::Vault(format!("invalid ciphertext encoding: {e}")))?;
        if bytes.len() <= NONCE_LEN {
            return Err(AuthError::Vault("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|e| AuthError::Vault(format!("decrypt failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| AuthError::Vault(format!("decrypted credential is not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let vault = Vault::derive("server secret");
        let sealed = vault.seal("portal-password-123").unwrap();
        assert_ne!(sealed, "portal-password-123");
        assert_eq!(vault.open(&sealed).unwrap(), "portal-password-123");
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let vault = Vault::derive("server secret");
        let a = vault.seal("same input").unwrap();
        let b = vault.seal("same input").unwrap();
        assert_ne!(a, b, "two seals of the same input must differ");
    }

    #[test]
    fn test_wrong_key_fails_to_open() {
        let vault = Vault::derive("server secret");
        let sealed = vault.seal("portal-password-123").unwrap();

        let other = Vault::derive("different secret");
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn test_garbage_input_is_rejected() {
        let vault = Vault::derive("server secret");
        assert!(vault.open("not base64 at all!!!").is_err());
        assert!(vault.open(&BASE64.encode(b"short")).is_err());
    }
}
