//! Password hashing, strength scoring and breach checking.
//!
//! Hashing and verification are CPU-bound and run on the blocking pool.
//! Verification carries a 5-second hard timeout so a pathological hash can
//! never pin a request handler. Strength and breach scoring run before any
//! database write during registration; the breach collaborator is opaque and
//! its outages never block the user.

use sha1::{Digest, Sha1};
use std::time::Duration;

use crate::error::AuthError;
use crate::utils::password::{hash_password, verify_password};

/// Hard ceiling on a single password verification
const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum password length accepted at registration
const MIN_PASSWORD_LENGTH: usize = 10;

/// Breach range API (k-anonymity: only the first 5 hash chars leave the
/// process)
const BREACH_RANGE_URL: &str = "https://api.pwnedpasswords.com/range";

#[derive(Clone)]
pub struct PasswordService {
    http: reqwest::Client,
    breach_check_enabled: bool,
}

impl PasswordService {
    pub fn new(breach_check_enabled: bool) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            breach_check_enabled,
        }
    }

    /// Hash on the blocking pool
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Hash task failed: {}", e)))?
    }

    /// Verify on the blocking pool, bounded by the hard timeout
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let password = password.to_string();
        let hash = hash.to_string();

        let verify_task = tokio::task::spawn_blocking(move || verify_password(&password, &hash));

        match tokio::time::timeout(VERIFY_TIMEOUT, verify_task).await {
            Ok(joined) => joined
                .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Verify task failed: {}", e)))?,
            Err(_) => {
                tracing::warn!("password_verification_timeout");
                Err(AuthError::InternalError(anyhow::anyhow!(
                    "Password verification timed out"
                )))
            }
        }
    }

    /// Strength gate: length, character variety, and trivially guessable
    /// shapes. Fails fast before any database write.
    pub fn validate_strength(&self, password: &str) -> Result<(), AuthError> {
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword(format!(
                "must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let classes = [
            password.chars().any(|c| c.is_ascii_uppercase()),
            password.chars().any(|c| c.is_ascii_lowercase()),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(|c| !c.is_ascii_alphanumeric()),
        ]
        .iter()
        .filter(|&&present| present)
        .count();

        if classes < 3 {
            return Err(AuthError::WeakPassword(
                "use at least three of: uppercase, lowercase, digits, symbols".to_string(),
            ));
        }

        let lowered = password.to_lowercase();
        let sequential = ["12345678", "abcdefgh", "qwertyui", "password"];
        if sequential.iter().any(|s| lowered.contains(s)) {
            return Err(AuthError::WeakPassword(
                "contains a common sequence".to_string(),
            ));
        }

        Ok(())
    }

    /// Breach lookup against the range API.
    ///
    /// A positive hit rejects the password; a service outage allows it
    /// through with a warning.
    pub async fn check_breach_status(&self, password: &str) -> Result<(), AuthError> {
        if !self.breach_check_enabled {
            return Ok(());
        }

        let digest = {
            let mut hasher = Sha1::new();
            hasher.update(password.as_bytes());
            hex::encode(hasher.finalize()).to_uppercase()
        };
        let (prefix, suffix) = digest.split_at(5);

        let url = format!("{}/{}", BREACH_RANGE_URL, prefix);
        let body = match self.http.get(&url).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(error = %e, "breach_check_unavailable");
                    return Ok(());
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "breach_check_unavailable");
                return Ok(());
            }
        };

        let leaked = body.lines().any(|line| {
            line.split(':')
                .next()
                .map(|candidate| candidate.eq_ignore_ascii_case(suffix))
                .unwrap_or(false)
        });

        if leaked {
            tracing::warn!("password_rejected_breached");
            return Err(AuthError::WeakPassword(
                "this password has appeared in known data breaches".to_string(),
            ));
        }

        Ok(())
    }

    /// Full gate run at registration and password reset
    pub async fn validate_new_password(&self, password: &str) -> Result<(), AuthError> {
        self.validate_strength(password)?;
        self.check_breach_status(password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PasswordService {
        PasswordService::new(false)
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let svc = service();
        let hash = svc.hash("CorrectHorseBatteryStaple!42").await.unwrap();
        assert!(svc.verify("CorrectHorseBatteryStaple!42", &hash).await.unwrap());
        assert!(!svc.verify("wrong", &hash).await.unwrap());
    }

    #[test]
    fn test_strength_rejects_short() {
        assert!(matches!(
            service().validate_strength("Ab1!x"),
            Err(AuthError::WeakPassword(_))
        ));
    }

    #[test]
    fn test_strength_requires_variety() {
        assert!(service().validate_strength("alllowercaseonly").is_err());
        assert!(service().validate_strength("CorrectHorse42").is_ok());
        assert!(service().validate_strength("CorrectHorseBatteryStaple!42").is_ok());
    }

    #[test]
    fn test_strength_rejects_common_sequences() {
        assert!(service().validate_strength("Password12345678!").is_err());
        assert!(service().validate_strength("Qwertyuiop12!A").is_err());
    }

    #[tokio::test]
    async fn test_breach_check_disabled_passes() {
        assert!(service().check_breach_status("anything").await.is_ok());
    }
}
