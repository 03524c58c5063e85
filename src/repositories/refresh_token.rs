use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::RefreshTokenRecord;
use crate::repositories::is_unique_violation;

/// Repository for persisted refresh tokens, keyed by `(user_id, jti)`
#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: PgPool,
}

impl RefreshTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a refresh token row. A duplicate `(user_id, jti)` is a
    /// programming error upstream and surfaces as an internal error.
    #[allow(clippy::too_many_arguments)]
    pub async fn save(
        &self,
        user_id: Uuid,
        token: &str,
        jti: &str,
        client_id: Option<&str>,
        scope: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        tracing::debug!(operation = "save_refresh_token", "repository call");

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token, jti, client_id, scope, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE)
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(jti)
        .bind(client_id)
        .bind(scope)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::InternalError(anyhow::anyhow!("Duplicate refresh token jti"))
            } else {
                AuthError::InternalError(e.into())
            }
        })?;

        Ok(())
    }

    /// True iff a non-revoked, unexpired row exists for this exact token
    pub async fn validate(&self, user_id: Uuid, token: &str) -> Result<bool, AuthError> {
        tracing::debug!(operation = "validate_refresh_token", "repository call");

        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM refresh_tokens
            WHERE user_id = $1 AND token = $2 AND revoked = FALSE AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::InternalError(e.into()))?;

        Ok(row.is_some())
    }

    #[allow(dead_code)]
    pub async fn find(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, AuthError> {
        tracing::debug!(operation = "get_refresh_token", "repository call");

        sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT user_id, token, jti, client_id, scope, expires_at, revoked
            FROM refresh_tokens
            WHERE user_id = $1 AND token = $2
            "#,
        )
        .bind(user_id)
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::InternalError(e.into()))
    }

    /// Mark one token revoked. Idempotent; returns true when this call was
    /// the one that flipped the row; the loser of a concurrent rotation
    /// race observes false.
    pub async fn revoke(&self, user_id: Uuid, token: &str) -> Result<bool, AuthError> {
        tracing::debug!(operation = "revoke_refresh_token", "repository call");

        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE user_id = $1 AND token = $2 AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::InternalError(e.into()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke every token for the user. Idempotent.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        tracing::debug!(operation = "revoke_all_refresh_tokens", "repository call");

        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE user_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::InternalError(e.into()))?;

        Ok(result.rows_affected())
    }
}
