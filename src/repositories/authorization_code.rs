use chrono::{Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::AuthorizationCode;

/// Authorization codes live at most this long after issue
pub const CODE_TTL_SECONDS: i64 = 60;

/// Repository for single-use authorization codes.
///
/// Consumption runs in a caller-owned transaction: the row is locked, checked
/// and flipped to `consumed` before commit, so a second consumer always sees
/// `consumed = TRUE` or no row.
#[derive(Clone)]
pub struct AuthorizationCodeRepository {
    pool: PgPool,
}

impl AuthorizationCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        code: &str,
        client_id: &str,
        user_id: Uuid,
        organization_id: Option<Uuid>,
        redirect_uri: &str,
        scopes: &[String],
        code_challenge: &str,
        code_challenge_method: &str,
        nonce: Option<&str>,
    ) -> Result<(), OAuthError> {
        tracing::debug!(operation = "create_authorization_code", "repository call");

        let expires_at = Utc::now() + Duration::seconds(CODE_TTL_SECONDS);

        sqlx::query(
            r#"
            INSERT INTO authorization_codes
                (id, code, client_id, user_id, organization_id, redirect_uri, scopes,
                 code_challenge, code_challenge_method, nonce, expires_at, consumed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(client_id)
        .bind(user_id)
        .bind(organization_id)
        .bind(redirect_uri)
        .bind(scopes)
        .bind(code_challenge)
        .bind(code_challenge_method)
        .bind(nonce)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(())
    }

    /// Lock the code row for the consuming transaction
    pub async fn find_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, OAuthError> {
        tracing::debug!(operation = "get_authorization_code", "repository call");

        sqlx::query_as::<_, AuthorizationCode>(
            r#"
            SELECT id, code, client_id, user_id, organization_id, redirect_uri, scopes,
                   code_challenge, code_challenge_method, nonce, expires_at, consumed, created_at
            FROM authorization_codes
            WHERE code = $1
            FOR UPDATE
            "#,
        )
        .bind(code)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))
    }

    /// Flip `consumed` inside the consuming transaction
    pub async fn mark_consumed(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<(), OAuthError> {
        tracing::debug!(operation = "consume_authorization_code", "repository call");

        let result = sqlx::query(
            r#"
            UPDATE authorization_codes
            SET consumed = TRUE
            WHERE id = $1 AND consumed = FALSE
            "#,
        )
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant(
                "Authorization code already used".to_string(),
            ));
        }
        Ok(())
    }

    /// Drop expired rows; run periodically, correctness never depends on it
    #[allow(dead_code)]
    pub async fn delete_expired(&self) -> Result<u64, OAuthError> {
        tracing::debug!(operation = "delete_expired_authorization_codes", "repository call");

        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }
}
