//! OAuth client registry: registration, authentication, redirect validation.
//!
//! Client secrets are hashed with bcrypt. Public clients never carry a
//! secret and presenting one is an authentication failure in itself.

use sqlx::PgPool;

use crate::error::OAuthError;
use crate::models::{ClientType, OAuthClient};
use crate::repositories::OAuthClientRepository;
use crate::utils::codes::generate_authorization_code;

/// Bcrypt cost for client secrets
const BCRYPT_COST: u32 = 12;

#[derive(Clone)]
pub struct OAuthClientService {
    repo: OAuthClientRepository,
}

impl OAuthClientService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: OAuthClientRepository::new(pool),
        }
    }

    pub async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>, OAuthError> {
        self.repo.find_by_client_id(client_id).await
    }

    /// Register a client; confidential clients get a generated secret
    /// returned exactly once in plain text.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_client(
        &self,
        client_id: &str,
        client_name: &str,
        client_type: ClientType,
        redirect_uris: &[String],
        allowed_scopes: &[String],
        require_pkce: bool,
        require_consent: bool,
        is_first_party: bool,
    ) -> Result<(OAuthClient, Option<String>), OAuthError> {
        let (secret, secret_hash) = match client_type {
            ClientType::Confidential => {
                let secret = generate_authorization_code();
                let hash = bcrypt::hash(&secret, BCRYPT_COST)
                    .map_err(|e| OAuthError::ServerError(format!("Secret hashing failed: {}", e)))?;
                (Some(secret), Some(hash))
            }
            ClientType::Public => (None, None),
        };

        let client = self
            .repo
            .create(
                client_id,
                client_name,
                client_type,
                secret_hash.as_deref(),
                redirect_uris,
                allowed_scopes,
                require_pkce,
                require_consent,
                is_first_party,
            )
            .await?;

        tracing::info!(client_id = %client_id, client_type = ?client_type, "oauth_client_created");
        Ok((client, secret))
    }

    /// Authenticate a token-endpoint caller.
    ///
    /// Public: the secret must be absent. Confidential: the secret must be
    /// present and verify against the stored hash. Every failure is the
    /// uniform `invalid_client`.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<OAuthClient, OAuthError> {
        let Some(client) = self.get_client(client_id).await? else {
            tracing::warn!(client_id = %client_id, "oauth_client_auth_failed_not_found");
            return Err(OAuthError::InvalidClient);
        };

        match client.client_type {
            ClientType::Public => {
                if client_secret.is_some() {
                    tracing::warn!(
                        client_id = %client_id,
                        "oauth_client_auth_failed_public_with_secret"
                    );
                    return Err(OAuthError::InvalidClient);
                }
                tracing::info!(client_id = %client_id, "oauth_client_authenticated_public");
                Ok(client)
            }
            ClientType::Confidential => {
                let Some(secret) = client_secret else {
                    tracing::warn!(client_id = %client_id, "oauth_client_auth_failed_no_secret");
                    return Err(OAuthError::InvalidClient);
                };
                let Some(hash) = client.client_secret_hash.as_deref() else {
                    tracing::error!(client_id = %client_id, "oauth_client_missing_secret_hash");
                    return Err(OAuthError::InvalidClient);
                };

                let valid = bcrypt::verify(secret, hash)
                    .map_err(|_| OAuthError::InvalidClient)?;
                if !valid {
                    tracing::warn!(
                        client_id = %client_id,
                        "oauth_client_auth_failed_invalid_secret"
                    );
                    return Err(OAuthError::InvalidClient);
                }

                tracing::info!(client_id = %client_id, "oauth_client_authenticated_confidential");
                Ok(client)
            }
        }
    }

    /// Exact-match redirect validation. No wildcards, no substrings, no
    /// path prefixes.
    pub fn validate_redirect_uri(&self, client: &OAuthClient, redirect_uri: &str) -> bool {
        let valid = client.has_redirect_uri(redirect_uri);
        if !valid {
            tracing::warn!(
                client_id = %client.client_id,
                requested_uri = %redirect_uri,
                "oauth_redirect_uri_mismatch"
            );
        }
        valid
    }
}
