use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::User;
use crate::repositories::is_unique_violation;
use crate::utils::email::normalize_email;

/// Repository for user account rows.
///
/// Email is case-folded here on every write and lookup so no caller can
/// bypass the invariant.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new unverified user. Duplicate email surfaces as
    /// `UserAlreadyExists`.
    pub async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, AuthError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuthError::InternalError(e.into()))?;
        let user = self.create_user_tx(&mut tx, email, password_hash).await?;
        tx.commit()
            .await
            .map_err(|e| AuthError::InternalError(e.into()))?;
        Ok(user)
    }

    /// Transactional variant used by registration, which must coordinate the
    /// user row with the verification-token write before committing.
    pub async fn create_user_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        email: &str,
        password_hash: &str,
    ) -> Result<User, AuthError> {
        tracing::debug!(operation = "create_user", "repository call");

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, is_verified, is_active, created_at)
            VALUES ($1, $2, $3, FALSE, TRUE, NOW())
            RETURNING id, email, password_hash, is_verified, is_active,
                      created_at, verified_at, last_login_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(normalize_email(email))
        .bind(password_hash)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::UserAlreadyExists
            } else {
                AuthError::InternalError(e.into())
            }
        })
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        tracing::debug!(operation = "get_user_by_email", "repository call");

        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_verified, is_active,
                   created_at, verified_at, last_login_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::InternalError(e.into()))
    }

    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        tracing::debug!(operation = "get_user_by_id", "repository call");

        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_verified, is_active,
                   created_at, verified_at, last_login_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::InternalError(e.into()))
    }

    /// Mark the user's email verified; false when the user does not exist
    pub async fn verify_email(&self, user_id: Uuid) -> Result<bool, AuthError> {
        tracing::debug!(operation = "verify_user_email", "repository call");

        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_verified = TRUE, verified_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::InternalError(e.into()))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<bool, AuthError> {
        tracing::debug!(operation = "update_password", "repository call");

        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::InternalError(e.into()))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn record_login(&self, user_id: Uuid) -> Result<(), AuthError> {
        tracing::debug!(operation = "record_login", "repository call");

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::InternalError(e.into()))?;

        Ok(())
    }
}
