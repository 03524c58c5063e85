use sqlx::PgPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::ConsentRecord;

/// Repository for persisted consent decisions.
///
/// The upsert merges scopes so incremental consent only ever widens the
/// grant; `organization_id` is part of the identity (NULL means a
/// user-scoped grant).
#[derive(Clone)]
pub struct ConsentRepository {
    pool: PgPool,
}

impl ConsentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        user_id: Uuid,
        client_id: &str,
        organization_id: Option<Uuid>,
    ) -> Result<Option<ConsentRecord>, OAuthError> {
        tracing::debug!(operation = "get_user_consent", "repository call");

        sqlx::query_as::<_, ConsentRecord>(
            r#"
            SELECT user_id, client_id, organization_id, granted_scopes, granted_at
            FROM user_consents
            WHERE user_id = $1 AND client_id = $2 AND organization_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))
    }

    /// Insert or widen a consent record with the union of scopes
    pub async fn upsert(
        &self,
        user_id: Uuid,
        client_id: &str,
        organization_id: Option<Uuid>,
        granted_scopes: &[String],
    ) -> Result<ConsentRecord, OAuthError> {
        tracing::debug!(operation = "save_user_consent", "repository call");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        let existing: Option<ConsentRecord> = sqlx::query_as(
            r#"
            SELECT user_id, client_id, organization_id, granted_scopes, granted_at
            FROM user_consents
            WHERE user_id = $1 AND client_id = $2 AND organization_id IS NOT DISTINCT FROM $3
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .bind(organization_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        let record = match existing {
            Some(current) => {
                let mut merged = current.granted_scopes.clone();
                for scope in granted_scopes {
                    if !merged.contains(scope) {
                        merged.push(scope.clone());
                    }
                }
                merged.sort();

                sqlx::query_as::<_, ConsentRecord>(
                    r#"
                    UPDATE user_consents
                    SET granted_scopes = $4, granted_at = NOW()
                    WHERE user_id = $1 AND client_id = $2
                      AND organization_id IS NOT DISTINCT FROM $3
                    RETURNING user_id, client_id, organization_id, granted_scopes, granted_at
                    "#,
                )
                .bind(user_id)
                .bind(client_id)
                .bind(organization_id)
                .bind(&merged)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?
            }
            None => {
                let mut scopes = granted_scopes.to_vec();
                scopes.sort();
                scopes.dedup();

                sqlx::query_as::<_, ConsentRecord>(
                    r#"
                    INSERT INTO user_consents
                        (user_id, client_id, organization_id, granted_scopes, granted_at)
                    VALUES ($1, $2, $3, $4, NOW())
                    RETURNING user_id, client_id, organization_id, granted_scopes, granted_at
                    "#,
                )
                .bind(user_id)
                .bind(client_id)
                .bind(organization_id)
                .bind(&scopes)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?
            }
        };

        tx.commit()
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(record)
    }

    /// Delete a consent record; false when none existed
    pub async fn delete(
        &self,
        user_id: Uuid,
        client_id: &str,
        organization_id: Option<Uuid>,
    ) -> Result<bool, OAuthError> {
        tracing::debug!(operation = "revoke_user_consent", "repository call");

        let result = sqlx::query(
            r#"
            DELETE FROM user_consents
            WHERE user_id = $1 AND client_id = $2 AND organization_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .bind(organization_id)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}
