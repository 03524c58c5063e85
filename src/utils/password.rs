//! Password hashing primitives (Argon2id).
//!
//! These are synchronous and CPU-bound; the service layer runs them on the
//! blocking pool with a hard verification timeout.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::AuthError;

/// Hash a password with Argon2id and a random salt, PHC string output
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored PHC hash.
///
/// A malformed stored hash is an internal error, not a mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        AuthError::InternalError(anyhow::anyhow!("Invalid password hash format: {}", e))
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_phc_format() {
        let hash = hash_password("CorrectHorseBatteryStaple!42").unwrap();
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn test_hash_never_equals_plaintext() {
        let password = "my_secret_password";
        assert_ne!(hash_password(password).unwrap(), password);
    }

    #[test]
    fn test_verify_correct_and_incorrect() {
        let hash = hash_password("correct-password").unwrap();
        assert!(verify_password("correct-password", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_salted_hashes_differ() {
        let h1 = hash_password("same").unwrap();
        let h2 = hash_password("same").unwrap();
        assert_ne!(h1, h2);
        assert!(verify_password("same", &h1).unwrap());
        assert!(verify_password("same", &h2).unwrap());
    }

    #[test]
    fn test_verify_invalid_hash_format_is_error() {
        assert!(verify_password("x", "not_a_valid_hash").is_err());
    }
}
