//! Registration and email verification.
//!
//! Registration coordinates two side effects: the user row and the opaque
//! verification token in the cache. The cache write happens inside the
//! database transaction: if it fails, the user row is rolled back and no
//! half-registered account remains. Email delivery stays outside the
//! transaction; its failure never aborts registration.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::AuthError;
use crate::models::OrganizationRole;
use crate::repositories::{OrganizationRepository, UserRepository};
use crate::services::email::EmailService;
use crate::services::password::PasswordService;
use crate::services::token_store::PREFIX_VERIFY;
use crate::utils::codes::{generate_opaque_token, generate_verification_code};
use crate::utils::email::{normalize_email, validate_email};

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResult {
    pub message: String,
    pub email: String,
    pub user_id: Uuid,
    pub verification_token: String,
}

#[derive(Clone)]
pub struct RegistrationService {
    pool: PgPool,
    user_repo: UserRepository,
    org_repo: OrganizationRepository,
    cache: CacheStore,
    password: PasswordService,
    email: EmailService,
    verification_ttl_seconds: u64,
    default_organization_id: Option<Uuid>,
}

impl RegistrationService {
    pub fn new(
        pool: PgPool,
        cache: CacheStore,
        password: PasswordService,
        email: EmailService,
        config: &Config,
    ) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            org_repo: OrganizationRepository::new(pool.clone()),
            pool,
            cache,
            password,
            email,
            verification_ttl_seconds: config.verification_code_ttl_seconds,
            default_organization_id: config.default_organization_id,
        }
    }

    /// Register a new user.
    ///
    /// Password strength and breach status are checked before any database
    /// write. The user row commits only after the verification token is in
    /// the cache, so a registered user can always verify.
    pub async fn register(&self, email: &str, password: &str) -> Result<RegistrationResult, AuthError> {
        let email = normalize_email(email);
        validate_email(&email)?;

        tracing::info!(email = %email, "user_registration_start");

        if self.user_repo.find_by_email(&email).await?.is_some() {
            tracing::warn!(email = %email, "user_registration_duplicate_email");
            return Err(AuthError::UserAlreadyExists);
        }

        self.password.validate_new_password(password).await?;
        let password_hash = self.password.hash(password).await?;

        let verification_code = generate_verification_code();
        let verification_token = generate_opaque_token();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuthError::InternalError(e.into()))?;

        let user = self
            .user_repo
            .create_user_tx(&mut tx, &email, &password_hash)
            .await?;

        // Cache write inside the logical transaction: a failure here aborts
        // the user row.
        let cache_key = format!("{}:{}", PREFIX_VERIFY, verification_token);
        let cache_value = format!("{}:{}", user.id, verification_code);
        if let Err(e) = self
            .cache
            .set_ex(&cache_key, &cache_value, self.verification_ttl_seconds)
            .await
        {
            tracing::error!(error = %e, "registration_token_write_failed_rolling_back");
            let _ = tx.rollback().await;
            return Err(AuthError::InternalError(anyhow::anyhow!(
                "Failed to store verification token"
            )));
        }

        tx.commit()
            .await
            .map_err(|e| AuthError::InternalError(e.into()))?;

        tracing::info!(user_id = %user.id, email = %user.email, "user_created");

        if let Some(org_id) = self.default_organization_id {
            match self
                .org_repo
                .add_member(user.id, org_id, OrganizationRole::Member)
                .await
            {
                Ok(_) => {
                    tracing::info!(user_id = %user.id, org_id = %org_id, "default_organization_assigned");
                }
                Err(e) => {
                    tracing::error!(error = %e, user_id = %user.id, "default_organization_assign_failed");
                }
            }
        }

        // Outside the transaction; retried out-of-band on failure.
        self.email
            .send_code(&user.email, &verification_code, "verification")
            .await;

        tracing::info!(user_id = %user.id, "user_registration_complete");

        Ok(RegistrationResult {
            message: "User registered successfully".to_string(),
            email: user.email,
            user_id: user.id,
            verification_token,
        })
    }

    /// Verify an account with the opaque token and emailed code
    pub async fn verify_account(&self, verification_token: &str, code: &str) -> Result<(), AuthError> {
        tracing::info!("account_verification_start");

        let cache_key = format!("{}:{}", PREFIX_VERIFY, verification_token);
        let stored = self
            .cache
            .get(&cache_key)
            .await
            .map_err(AuthError::InternalError)?;

        let Some(stored) = stored else {
            tracing::warn!("account_verification_token_missing");
            return Err(AuthError::InvalidToken);
        };

        let Some((user_id_str, stored_code)) = stored.split_once(':') else {
            tracing::error!("account_verification_malformed_value");
            return Err(AuthError::InvalidToken);
        };

        if !crate::utils::codes::constant_time_compare(code, stored_code) {
            tracing::warn!("account_verification_code_mismatch");
            return Err(AuthError::InvalidToken);
        }

        let user_id = Uuid::parse_str(user_id_str).map_err(|_| AuthError::InvalidToken)?;

        if !self.user_repo.verify_email(user_id).await? {
            return Err(AuthError::UserNotFound);
        }

        if let Err(e) = self.cache.delete(&cache_key).await {
            tracing::warn!(error = %e, "account_verification_token_delete_failed");
        }

        tracing::info!(user_id = %user_id, "account_verification_success");
        Ok(())
    }

    /// Re-issue a verification code for an unverified account.
    ///
    /// The response is identical whether or not the account exists or is
    /// already verified.
    pub async fn resend_verification(&self, email: &str) -> Result<Option<String>, AuthError> {
        let email = normalize_email(email);

        let Some(user) = self.user_repo.find_by_email(&email).await? else {
            tracing::debug!("resend_verification_unknown_email");
            return Ok(None);
        };

        if user.is_verified {
            tracing::debug!(user_id = %user.id, "resend_verification_already_verified");
            return Ok(None);
        }

        let verification_code = generate_verification_code();
        let verification_token = generate_opaque_token();

        let cache_key = format!("{}:{}", PREFIX_VERIFY, verification_token);
        let cache_value = format!("{}:{}", user.id, verification_code);
        self.cache
            .set_ex(&cache_key, &cache_value, self.verification_ttl_seconds)
            .await
            .map_err(AuthError::InternalError)?;

        self.email
            .send_code(&user.email, &verification_code, "verification")
            .await;

        tracing::info!(user_id = %user.id, "verification_code_resent");
        Ok(Some(verification_token))
    }
}
