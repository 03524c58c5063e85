//! Optional TOTP second factor.
//!
//! Secrets are encrypted at rest in the cache. Failed challenge codes
//! increment a per-user-per-purpose counter; three failures inside five
//! minutes lock the user out until the counter expires.

use serde::Serialize;
use sqlx::PgPool;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::error::AuthError;
use crate::repositories::UserRepository;
use crate::utils::crypto::SecretCipher;

/// Pending setup secrets live this long
const SETUP_PENDING_TTL_SECONDS: u64 = 600;

/// Lockout window for failed challenge codes
const ATTEMPT_WINDOW_SECONDS: u64 = 300;

/// Failures inside the window before lockout
const MAX_FAILED_ATTEMPTS: i64 = 3;

const TOTP_ISSUER: &str = "Gatehouse";

#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_uri: String,
}

#[derive(Clone)]
pub struct TwoFactorService {
    user_repo: UserRepository,
    cache: CacheStore,
    cipher: SecretCipher,
}

impl TwoFactorService {
    pub fn new(pool: PgPool, cache: CacheStore, cipher: SecretCipher) -> Self {
        Self {
            user_repo: UserRepository::new(pool),
            cache,
            cipher,
        }
    }

    fn enabled_key(user_id: Uuid) -> String {
        format!("2FA:{}:totp_enabled", user_id)
    }

    fn secret_key(user_id: Uuid) -> String {
        format!("2FA:{}:totp_secret", user_id)
    }

    fn setup_pending_key(user_id: Uuid) -> String {
        format!("2FA:{}:setup_pending", user_id)
    }

    fn attempts_key(user_id: Uuid, purpose: &str) -> String {
        format!("2FA_ATTEMPTS:{}:{}", user_id, purpose)
    }

    fn build_totp(secret_base32: &str, account_name: &str) -> Result<TOTP, AuthError> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Invalid TOTP secret: {:?}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(TOTP_ISSUER.to_string()),
            account_name.to_string(),
        )
        .map_err(|e| AuthError::InternalError(anyhow::anyhow!("TOTP construction failed: {}", e)))
    }

    fn verify_code(secret_base32: &str, account_name: &str, code: &str) -> Result<bool, AuthError> {
        let totp = Self::build_totp(secret_base32, account_name)?;
        totp.check_current(code)
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Clock error: {}", e)))
    }

    pub async fn is_enabled(&self, user_id: Uuid) -> Result<bool, AuthError> {
        let enabled = self
            .cache
            .get(&Self::enabled_key(user_id))
            .await
            .map_err(AuthError::InternalError)?;
        Ok(enabled.as_deref() == Some("true"))
    }

    /// Begin setup: generate a secret, hold it encrypted as pending, return
    /// the secret and provisioning URI for QR rendering.
    pub async fn setup(&self, user_id: Uuid) -> Result<TwoFactorSetup, AuthError> {
        tracing::info!(user_id = %user_id, "2fa_setup_start");

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if self.is_enabled(user_id).await? {
            return Err(AuthError::TwoFactorSetup(
                "2FA is already enabled".to_string(),
            ));
        }

        let secret = match Secret::generate_secret().to_encoded() {
            Secret::Encoded(encoded) => encoded,
            Secret::Raw(_) => {
                return Err(AuthError::InternalError(anyhow::anyhow!(
                    "Secret encoding failed"
                )))
            }
        };
        let encrypted = self.cipher.encrypt_secret(&secret)?;

        self.cache
            .set_ex(
                &Self::setup_pending_key(user_id),
                &encrypted,
                SETUP_PENDING_TTL_SECONDS,
            )
            .await
            .map_err(AuthError::InternalError)?;

        let otpauth_uri = Self::build_totp(&secret, &user.email)?.get_url();

        tracing::info!(user_id = %user_id, "2fa_secret_generated");
        Ok(TwoFactorSetup {
            secret,
            otpauth_uri,
        })
    }

    /// Complete setup: prove possession of the secret with one valid code
    pub async fn verify_and_enable(&self, user_id: Uuid, code: &str) -> Result<(), AuthError> {
        tracing::info!(user_id = %user_id, "2fa_enable_start");

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let pending = self
            .cache
            .get(&Self::setup_pending_key(user_id))
            .await
            .map_err(AuthError::InternalError)?
            .ok_or_else(|| {
                AuthError::TwoFactorSetup("2FA setup not initiated or expired".to_string())
            })?;

        let secret = self.cipher.decrypt_secret(&pending)?;

        if !Self::verify_code(&secret, &user.email, code)? {
            tracing::warn!(user_id = %user_id, "2fa_enable_invalid_code");
            return Err(AuthError::TwoFactorVerification(
                "Invalid 2FA code".to_string(),
            ));
        }

        let encrypted = self.cipher.encrypt_secret(&secret)?;
        self.cache
            .set(&Self::secret_key(user_id), &encrypted)
            .await
            .map_err(AuthError::InternalError)?;
        self.cache
            .set(&Self::enabled_key(user_id), "true")
            .await
            .map_err(AuthError::InternalError)?;
        self.cache
            .delete(&Self::setup_pending_key(user_id))
            .await
            .map_err(AuthError::InternalError)?;

        tracing::info!(user_id = %user_id, "2fa_enabled");
        Ok(())
    }

    /// Disable the second factor and clear counters
    pub async fn disable(&self, user_id: Uuid) -> Result<(), AuthError> {
        tracing::info!(user_id = %user_id, "2fa_disable_start");

        for key in [
            Self::secret_key(user_id),
            Self::enabled_key(user_id),
            Self::setup_pending_key(user_id),
            Self::attempts_key(user_id, "login"),
        ] {
            self.cache.delete(&key).await.map_err(AuthError::InternalError)?;
        }

        tracing::info!(user_id = %user_id, "2fa_disabled");
        Ok(())
    }

    /// Validate a login-time TOTP challenge under the attempt counter.
    ///
    /// The counter is checked before the code so a locked-out user learns
    /// nothing about code validity.
    pub async fn validate_challenge(
        &self,
        user_id: Uuid,
        code: &str,
        purpose: &str,
    ) -> Result<(), AuthError> {
        tracing::info!(user_id = %user_id, purpose, "2fa_challenge_start");

        let attempts_key = Self::attempts_key(user_id, purpose);
        let attempts = self
            .cache
            .get(&attempts_key)
            .await
            .map_err(AuthError::InternalError)?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);

        if attempts >= MAX_FAILED_ATTEMPTS {
            tracing::warn!(user_id = %user_id, attempts, "2fa_challenge_locked_out");
            return Err(AuthError::TooManyAttempts);
        }

        if !self.is_enabled(user_id).await? {
            return Err(AuthError::TwoFactorVerification(
                "2FA not enabled for this user".to_string(),
            ));
        }

        let encrypted = self
            .cache
            .get(&Self::secret_key(user_id))
            .await
            .map_err(AuthError::InternalError)?
            .ok_or_else(|| {
                AuthError::TwoFactorVerification("2FA configuration missing".to_string())
            })?;
        let secret = self.cipher.decrypt_secret(&encrypted)?;

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !Self::verify_code(&secret, &user.email, code)? {
            let count = self
                .cache
                .incr_with_expiry(&attempts_key, ATTEMPT_WINDOW_SECONDS)
                .await
                .map_err(AuthError::InternalError)?;

            tracing::warn!(user_id = %user_id, failed_attempts = count, "2fa_challenge_failed");

            if count >= MAX_FAILED_ATTEMPTS {
                return Err(AuthError::TooManyAttempts);
            }
            return Err(AuthError::TwoFactorVerification(
                "Invalid 2FA code".to_string(),
            ));
        }

        if let Err(e) = self.cache.delete(&attempts_key).await {
            tracing::warn!(error = %e, "2fa_attempts_reset_failed");
        }

        tracing::info!(user_id = %user_id, "2fa_challenge_success");
        Ok(())
    }
}
