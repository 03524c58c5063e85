//! Password reset: request and confirmation.
//!
//! The request response is invariant: identical whether or not the account
//! exists. Confirmation validates the code, enforces the password gate,
//! updates the hash and revokes every refresh token the user holds.

use sqlx::PgPool;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::AuthError;
use crate::repositories::{RefreshTokenRepository, UserRepository};
use crate::services::email::EmailService;
use crate::services::password::PasswordService;
use crate::services::token_store::{OpaqueTokenStore, PREFIX_RESET};
use crate::utils::codes::generate_verification_code;
use crate::utils::email::normalize_email;

/// The one message this flow ever returns for a request
pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account with this email exists, a password reset code has been sent.";

#[derive(Clone)]
pub struct PasswordResetService {
    user_repo: UserRepository,
    refresh_repo: RefreshTokenRepository,
    token_store: OpaqueTokenStore,
    password: PasswordService,
    email: EmailService,
    reset_ttl_seconds: u64,
}

impl PasswordResetService {
    pub fn new(
        pool: PgPool,
        cache: CacheStore,
        password: PasswordService,
        email: EmailService,
        config: &Config,
    ) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            refresh_repo: RefreshTokenRepository::new(pool),
            token_store: OpaqueTokenStore::new(cache),
            password,
            email,
            reset_ttl_seconds: config.reset_code_ttl_seconds,
        }
    }

    /// Request a reset. Returns the opaque token when one was issued; the
    /// HTTP layer sends the same generic message either way.
    pub async fn request_reset(&self, email: &str) -> Result<Option<String>, AuthError> {
        let email = normalize_email(email);
        tracing::info!("password_reset_request_start");

        let Some(user) = self.user_repo.find_by_email(&email).await? else {
            tracing::debug!("password_reset_unknown_email");
            return Ok(None);
        };

        let reset_code = generate_verification_code();
        let reset_token = self
            .token_store
            .store(user.id, &reset_code, PREFIX_RESET, self.reset_ttl_seconds)
            .await
            .map_err(AuthError::InternalError)?;

        self.email
            .send_code(&user.email, &reset_code, "password reset")
            .await;

        tracing::info!(user_id = %user.id, "password_reset_code_issued");
        Ok(Some(reset_token))
    }

    /// Confirm a reset: code, password gate, hash update, token cleanup,
    /// global refresh revocation.
    pub async fn confirm_reset(
        &self,
        reset_token: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        tracing::info!("password_reset_confirm_start");

        let user_id = self
            .token_store
            .verify(reset_token, code, PREFIX_RESET)
            .await
            .map_err(AuthError::InternalError)?
            .ok_or(AuthError::InvalidToken)?;

        self.password.validate_new_password(new_password).await?;
        let password_hash = self.password.hash(new_password).await?;

        if !self.user_repo.update_password(user_id, &password_hash).await? {
            tracing::error!(user_id = %user_id, "password_reset_user_vanished");
            return Err(AuthError::UserNotFound);
        }

        if let Err(e) = self.token_store.delete(reset_token, PREFIX_RESET).await {
            tracing::warn!(error = %e, "password_reset_token_delete_failed");
        }

        let revoked = self.refresh_repo.revoke_all(user_id).await?;
        tracing::info!(
            user_id = %user_id,
            revoked_tokens = revoked,
            "password_reset_complete"
        );

        Ok(())
    }
}

/// Convenience for handlers that only need the user-facing envelope
pub fn generic_reset_response() -> serde_json::Value {
    serde_json::json!({ "message": RESET_REQUESTED_MESSAGE })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_response_is_invariant() {
        assert_eq!(
            generic_reset_response(),
            serde_json::json!({
                "message": "If an account with this email exists, a password reset code has been sent."
            })
        );
    }
}
