//! Authorization code issuance and atomic consumption.
//!
//! Codes are single-use and expire 60 seconds after issue. Consumption runs
//! in one database transaction: the row is locked, every binding is checked
//! (expiry, consumption, client, redirect snapshot, PKCE proof), and only
//! then is `consumed` committed. A replay, a mismatched client, an altered
//! redirect or a failed PKCE proof are all the same `invalid_grant` to the
//! caller; only the log line carries the subreason.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::AuthorizationCode;
use crate::repositories::AuthorizationCodeRepository;
use crate::utils::codes::generate_authorization_code;
use crate::utils::pkce::{validate, validate_code_challenge, validate_code_verifier};

#[derive(Clone)]
pub struct AuthorizationCodeService {
    pool: PgPool,
    repo: AuthorizationCodeRepository,
}

impl AuthorizationCodeService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: AuthorizationCodeRepository::new(pool.clone()),
            pool,
        }
    }

    /// Issue a code bound to the request's client, user, redirect snapshot
    /// and PKCE challenge.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        client_id: &str,
        user_id: Uuid,
        organization_id: Option<Uuid>,
        redirect_uri: &str,
        scopes: &[String],
        code_challenge: &str,
        code_challenge_method: &str,
        nonce: Option<&str>,
    ) -> Result<String, OAuthError> {
        if !validate_code_challenge(code_challenge, code_challenge_method) {
            return Err(OAuthError::InvalidRequest(
                "Invalid code_challenge format".to_string(),
            ));
        }

        let code = generate_authorization_code();

        self.repo
            .create(
                &code,
                client_id,
                user_id,
                organization_id,
                redirect_uri,
                scopes,
                code_challenge,
                code_challenge_method,
                nonce,
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            client_id = %client_id,
            org_id = ?organization_id,
            scopes_count = scopes.len(),
            "authorization_code_created"
        );
        Ok(code)
    }

    /// Validate every binding and consume the code atomically.
    ///
    /// At most one caller ever succeeds for a given code, under arbitrary
    /// concurrency: the row lock serializes consumers and the `consumed`
    /// flip commits with the validation.
    pub async fn validate_and_consume(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<AuthorizationCode, OAuthError> {
        if !validate_code_verifier(code_verifier) {
            tracing::warn!(client_id = %client_id, "authz_code_invalid_verifier_format");
            return Err(OAuthError::InvalidGrant(
                "Invalid or expired authorization code".to_string(),
            ));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        let Some(record) = self.repo.find_for_update(&mut tx, code).await? else {
            tracing::warn!(client_id = %client_id, subreason = "not_found", "authz_code_rejected");
            return Err(invalid_grant());
        };

        if record.consumed {
            tracing::warn!(client_id = %client_id, subreason = "replayed", "authz_code_rejected");
            return Err(invalid_grant());
        }

        if record.is_expired(chrono::Utc::now()) {
            tracing::warn!(client_id = %client_id, subreason = "expired", "authz_code_rejected");
            return Err(invalid_grant());
        }

        if record.client_id != client_id {
            tracing::warn!(
                client_id = %client_id,
                subreason = "client_mismatch",
                "authz_code_rejected"
            );
            return Err(invalid_grant());
        }

        if record.redirect_uri != redirect_uri {
            tracing::warn!(
                client_id = %client_id,
                subreason = "redirect_uri_mismatch",
                "authz_code_rejected"
            );
            return Err(invalid_grant());
        }

        if !validate(
            &record.code_challenge,
            code_verifier,
            &record.code_challenge_method,
        ) {
            tracing::warn!(
                client_id = %client_id,
                user_id = %record.user_id,
                subreason = "pkce_failed",
                "authz_code_rejected"
            );
            return Err(invalid_grant());
        }

        self.repo.mark_consumed(&mut tx, record.id).await?;

        tx.commit()
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        tracing::info!(
            user_id = %record.user_id,
            client_id = %client_id,
            scopes_count = record.scopes.len(),
            "authorization_code_consumed"
        );
        Ok(record)
    }
}

/// All rejection paths look the same to the caller
fn invalid_grant() -> OAuthError {
    OAuthError::InvalidGrant("Invalid or expired authorization code".to_string())
}
