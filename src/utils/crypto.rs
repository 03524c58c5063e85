//! At-rest encryption for TOTP secrets.
//!
//! `ENCRYPTION_KEY` is run through HKDF-SHA256 (fixed info string) to derive
//! a 32-byte AES-256-GCM key. The random 96-bit nonce is prepended to the
//! ciphertext and the result is base64url-encoded. This is the only accepted
//! key derivation; a short key aborts startup in `Config::from_env`.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::AuthError;

/// Minimum length for the raw encryption key material
pub const MIN_KEY_LENGTH: usize = 32;

const HKDF_INFO: &[u8] = b"totp-secret-encryption";
const NONCE_LENGTH: usize = 12;

/// Symmetric cipher for secrets stored in the cache
#[derive(Clone)]
pub struct SecretCipher {
    key: Key<Aes256Gcm>,
}

impl SecretCipher {
    /// Derive the AES key from the configured key material
    pub fn new(key_material: &str) -> Result<Self, AuthError> {
        if key_material.len() < MIN_KEY_LENGTH {
            return Err(AuthError::InternalError(anyhow::anyhow!(
                "Encryption key must be at least {} bytes",
                MIN_KEY_LENGTH
            )));
        }

        let hkdf = Hkdf::<Sha256>::new(None, key_material.as_bytes());
        let mut derived = [0u8; 32];
        hkdf.expand(HKDF_INFO, &mut derived)
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Key derivation failed: {}", e)))?;

        Ok(Self {
            key: Key::<Aes256Gcm>::from(derived),
        })
    }

    /// Encrypt a secret; output is base64url(nonce ∥ ciphertext)
    pub fn encrypt_secret(&self, plaintext: &str) -> Result<String, AuthError> {
        let cipher = Aes256Gcm::new(&self.key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Encryption failed: {}", e)))?;

        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    /// Decrypt a blob produced by [`encrypt_secret`](Self::encrypt_secret)
    pub fn decrypt_secret(&self, encoded: &str) -> Result<String, AuthError> {
        let blob = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AuthError::InvalidToken)?;

        if blob.len() <= NONCE_LENGTH {
            return Err(AuthError::InvalidToken);
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher = Aes256Gcm::new(&self.key);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AuthError::InvalidToken)?;

        String::from_utf8(plaintext).map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "unit-test-encryption-key-material-at-least-32";

    #[test]
    fn test_new_rejects_short_key() {
        assert!(SecretCipher::new("short").is_err());
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = SecretCipher::new(KEY).unwrap();
        let secret = "JBSWY3DPEHPK3PXP";

        let encrypted = cipher.encrypt_secret(secret).unwrap();
        assert_ne!(encrypted, secret);
        assert_eq!(cipher.decrypt_secret(&encrypted).unwrap(), secret);
    }

    #[test]
    fn test_encrypt_is_randomized() {
        let cipher = SecretCipher::new(KEY).unwrap();
        let a = cipher.encrypt_secret("same-secret").unwrap();
        let b = cipher.encrypt_secret("same-secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_rejects_tampering() {
        let cipher = SecretCipher::new(KEY).unwrap();
        let encrypted = cipher.encrypt_secret("JBSWY3DPEHPK3PXP").unwrap();

        let mut tampered = encrypted.clone();
        tampered.pop();
        tampered.push(if encrypted.ends_with('A') { 'B' } else { 'A' });

        assert!(cipher.decrypt_secret(&tampered).is_err());
    }

    #[test]
    fn test_decrypt_rejects_wrong_key() {
        let cipher = SecretCipher::new(KEY).unwrap();
        let other = SecretCipher::new("a-different-encryption-key-material-32b!").unwrap();

        let encrypted = cipher.encrypt_secret("JBSWY3DPEHPK3PXP").unwrap();
        assert!(other.decrypt_secret(&encrypted).is_err());
    }

    #[test]
    fn test_decrypt_rejects_garbage() {
        let cipher = SecretCipher::new(KEY).unwrap();
        assert!(cipher.decrypt_secret("not-base64!!").is_err());
        assert!(cipher.decrypt_secret("AAAA").is_err());
    }
}
