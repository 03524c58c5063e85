use sqlx::PgPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::{ClientType, OAuthClient};
use crate::repositories::is_unique_violation;

/// Repository for registered OAuth clients
#[derive(Clone)]
pub struct OAuthClientRepository {
    pool: PgPool,
}

impl OAuthClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        client_id: &str,
        client_name: &str,
        client_type: ClientType,
        client_secret_hash: Option<&str>,
        redirect_uris: &[String],
        allowed_scopes: &[String],
        require_pkce: bool,
        require_consent: bool,
        is_first_party: bool,
    ) -> Result<OAuthClient, OAuthError> {
        tracing::debug!(operation = "create_oauth_client", "repository call");

        sqlx::query_as::<_, OAuthClient>(
            r#"
            INSERT INTO oauth_clients
                (id, client_id, client_name, client_type, client_secret_hash,
                 redirect_uris, allowed_scopes, require_pkce, require_consent,
                 is_first_party, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            RETURNING id, client_id, client_name, client_type, client_secret_hash,
                      redirect_uris, allowed_scopes, require_pkce, require_consent,
                      is_first_party, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(client_name)
        .bind(client_type)
        .bind(client_secret_hash)
        .bind(redirect_uris)
        .bind(allowed_scopes)
        .bind(require_pkce)
        .bind(require_consent)
        .bind(is_first_party)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                OAuthError::InvalidRequest("client_id already registered".to_string())
            } else {
                OAuthError::ServerError(format!("Database error: {}", e))
            }
        })
    }

    pub async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<OAuthClient>, OAuthError> {
        tracing::debug!(operation = "get_oauth_client", "repository call");

        sqlx::query_as::<_, OAuthClient>(
            r#"
            SELECT id, client_id, client_name, client_type, client_secret_hash,
                   redirect_uris, allowed_scopes, require_pkce, require_consent,
                   is_first_party, created_at
            FROM oauth_clients
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))
    }

}
