//! Token service: mints, rotates and revokes the service's JWTs.
//!
//! Access tokens are short-lived and stateless except for the jti denylist.
//! Refresh tokens are long-lived JWTs additionally persisted per
//! `(user_id, jti)`; rotation revokes the old row and mints a fresh pair.
//! Rotation races serialize through the store: exactly one concurrent use of
//! a refresh token wins.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{AuthError, OAuthError};
use crate::models::OAuthClient;
use crate::repositories::RefreshTokenRepository;
use crate::services::scope::ScopeService;
use crate::utils::jwt::{Claims, JwtManager, TokenType};

/// Pre-auth tokens bridge the email code step to the TOTP step
const TWO_FACTOR_PRE_AUTH_TTL_MINUTES: i64 = 5;

/// First-party token pair
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,
}

/// OAuth token response (RFC 6749 §5.1)
#[derive(Debug, Clone, Serialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct TokenService {
    jwt: JwtManager,
    refresh_repo: RefreshTokenRepository,
    cache: CacheStore,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(pool: PgPool, cache: CacheStore, jwt: JwtManager, config: &Config) -> Self {
        Self {
            jwt,
            refresh_repo: RefreshTokenRepository::new(pool),
            cache,
            issuer: config.issuer.trim_end_matches('/').to_string(),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
        }
    }

    fn denylist_key(jti: &str) -> String {
        format!("blacklist:jti:{}", jti)
    }

    pub fn access_token_expires_in(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// First-party access token, optionally org-scoped
    pub fn create_access_token(&self, user_id: Uuid, org_id: Option<Uuid>) -> Result<String, AuthError> {
        let mut claims = Claims::new(&self.issuer, user_id, TokenType::Access);
        claims.org_id = org_id;
        let token = self.jwt.create(claims, self.access_ttl)?;

        tracing::info!(user_id = %user_id, org_id = ?org_id, "access_token_created");
        Ok(token)
    }

    /// First-party refresh token, persisted by `(user_id, jti)`
    pub async fn create_refresh_token(
        &self,
        user_id: Uuid,
        org_id: Option<Uuid>,
    ) -> Result<String, AuthError> {
        let mut claims = Claims::new(&self.issuer, user_id, TokenType::Refresh);
        claims.org_id = org_id;
        let jti = claims.jti.clone();

        let token = self.jwt.create(claims, self.refresh_ttl)?;
        let expires_at = Utc::now() + self.refresh_ttl;

        self.refresh_repo
            .save(user_id, &token, &jti, None, None, expires_at)
            .await?;

        tracing::info!(user_id = %user_id, org_id = ?org_id, jti = %jti, "refresh_token_created");
        Ok(token)
    }

    /// Short-lived pre-auth token exchanged for full tokens with a valid TOTP
    pub fn create_2fa_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        let claims = Claims::new(&self.issuer, user_id, TokenType::TwoFactorPreAuth);
        let token = self
            .jwt
            .create(claims, Duration::minutes(TWO_FACTOR_PRE_AUTH_TTL_MINUTES))?;

        tracing::info!(user_id = %user_id, "2fa_pre_auth_token_created");
        Ok(token)
    }

    /// Full first-party pair
    pub async fn create_token_response(
        &self,
        user_id: Uuid,
        org_id: Option<Uuid>,
    ) -> Result<TokenResponse, AuthError> {
        let access_token = self.create_access_token(user_id, org_id)?;
        let refresh_token = self.create_refresh_token(user_id, org_id).await?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.access_token_expires_in(),
            org_id,
        })
    }

    /// OAuth access token with the full claim set
    pub fn create_oauth_access_token(
        &self,
        user_id: Uuid,
        client_id: &str,
        scopes: &[String],
        org_id: Option<Uuid>,
    ) -> Result<String, AuthError> {
        let mut claims = Claims::new(&self.issuer, user_id, TokenType::Access);
        claims.aud = Some(vec![format!("{}/api", self.issuer)]);
        claims.scope = Some(scopes.join(" "));
        claims.client_id = Some(client_id.to_string());
        claims.azp = Some(client_id.to_string());
        claims.org_id = org_id;

        let jti = claims.jti.clone();
        let token = self.jwt.create(claims, self.access_ttl)?;

        tracing::info!(
            user_id = %user_id,
            client_id = %client_id,
            org_id = ?org_id,
            jti = %jti,
            "oauth_access_token_created"
        );
        Ok(token)
    }

    /// OAuth refresh token; carries client and scope for rotation-time checks
    pub async fn create_oauth_refresh_token(
        &self,
        user_id: Uuid,
        client_id: &str,
        scopes: &[String],
        org_id: Option<Uuid>,
    ) -> Result<String, AuthError> {
        let scope = scopes.join(" ");
        let mut claims = Claims::new(&self.issuer, user_id, TokenType::Refresh);
        claims.scope = Some(scope.clone());
        claims.client_id = Some(client_id.to_string());
        claims.org_id = org_id;
        let jti = claims.jti.clone();

        let token = self.jwt.create(claims, self.refresh_ttl)?;
        let expires_at = Utc::now() + self.refresh_ttl;

        self.refresh_repo
            .save(
                user_id,
                &token,
                &jti,
                Some(client_id),
                Some(&scope),
                expires_at,
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            client_id = %client_id,
            jti = %jti,
            "oauth_refresh_token_created"
        );
        Ok(token)
    }

    pub async fn create_oauth_token_response(
        &self,
        user_id: Uuid,
        client_id: &str,
        scopes: &[String],
        org_id: Option<Uuid>,
    ) -> Result<OAuthTokenResponse, AuthError> {
        let access_token = self.create_oauth_access_token(user_id, client_id, scopes, org_id)?;
        let refresh_token = self
            .create_oauth_refresh_token(user_id, client_id, scopes, org_id)
            .await?;

        Ok(OAuthTokenResponse {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.access_token_expires_in(),
            scope: scopes.join(" "),
            org_id,
        })
    }

    /// First-party refresh: decode, confirm the store row, rotate
    pub async fn refresh_first_party(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let claims = self.jwt.decode(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            tracing::warn!(got = %claims.token_type, "token_refresh_wrong_type");
            return Err(AuthError::InvalidToken);
        }

        let user_id = claims.user_id()?;
        let org_id = claims.org_id;

        if !self.refresh_repo.validate(user_id, refresh_token).await? {
            tracing::warn!(user_id = %user_id, jti = %claims.jti, "token_refresh_revoked_or_missing");
            return Err(AuthError::InvalidToken);
        }

        // Rotation: exactly one concurrent use wins this update.
        if !self.refresh_repo.revoke(user_id, refresh_token).await? {
            tracing::warn!(user_id = %user_id, "token_refresh_lost_rotation_race");
            return Err(AuthError::InvalidToken);
        }

        let response = self.create_token_response(user_id, org_id).await?;
        tracing::info!(user_id = %user_id, org_id = ?org_id, "token_refresh_complete");
        Ok(response)
    }

    /// OAuth refresh grant with rotation and optional downscoping.
    ///
    /// The decoded token must belong to the authenticated client; the store
    /// row must be live; a `scope` parameter must be a subset of the
    /// original grant.
    pub async fn refresh_oauth(
        &self,
        refresh_token: &str,
        client: &OAuthClient,
        requested_scope: Option<&str>,
    ) -> Result<OAuthTokenResponse, OAuthError> {
        let claims = self.jwt.decode(refresh_token).map_err(|_| {
            OAuthError::InvalidGrant("Invalid refresh token".to_string())
        })?;

        if claims.token_type != TokenType::Refresh {
            return Err(OAuthError::InvalidGrant("Invalid token type".to_string()));
        }

        let user_id = claims
            .user_id()
            .map_err(|_| OAuthError::InvalidGrant("Invalid subject".to_string()))?;
        let original_scopes = claims.scopes();
        let org_id = claims.org_id;

        match claims.client_id.as_deref() {
            Some(token_client) if token_client == client.client_id => {}
            _ => {
                tracing::warn!(
                    token_client = ?claims.client_id,
                    request_client = %client.client_id,
                    "oauth_refresh_client_mismatch"
                );
                return Err(OAuthError::InvalidGrant("Client mismatch".to_string()));
            }
        }

        let live = self
            .refresh_repo
            .validate(user_id, refresh_token)
            .await
            .map_err(|e| OAuthError::ServerError(e.to_string()))?;
        if !live {
            return Err(OAuthError::InvalidGrant(
                "Token has been revoked or expired".to_string(),
            ));
        }

        let new_scopes = match requested_scope {
            Some(scope) => {
                let requested = ScopeService::parse_scope_string(scope);
                if !ScopeService::validate_downscoping(&original_scopes, &requested) {
                    return Err(OAuthError::InvalidScope(
                        "Requested scopes exceed original grant".to_string(),
                    ));
                }
                tracing::info!(
                    original_count = original_scopes.len(),
                    new_count = requested.len(),
                    "oauth_refresh_downscoped"
                );
                requested
            }
            None => original_scopes,
        };

        let won_rotation = self
            .refresh_repo
            .revoke(user_id, refresh_token)
            .await
            .map_err(|e| OAuthError::ServerError(e.to_string()))?;
        if !won_rotation {
            return Err(OAuthError::InvalidGrant(
                "Token has been revoked or expired".to_string(),
            ));
        }

        let response = self
            .create_oauth_token_response(user_id, &client.client_id, &new_scopes, org_id)
            .await
            .map_err(|e| OAuthError::ServerError(e.to_string()))?;

        tracing::info!(
            user_id = %user_id,
            client_id = %client.client_id,
            "oauth_token_refreshed"
        );
        Ok(response)
    }

    /// RFC 7009 revocation: always succeeds from the caller's point of view.
    ///
    /// Refresh tokens flip the store row; access tokens join the jti
    /// denylist for their remaining life. Unknown, expired, or foreign
    /// tokens are silently ignored.
    pub async fn revoke_token(&self, token: &str, client: &OAuthClient) -> Result<(), OAuthError> {
        let claims = match self.jwt.decode(token) {
            Ok(claims) => claims,
            // Invalid or expired: nothing to revoke, still 200.
            Err(_) => return Ok(()),
        };

        // A token minted for another client is not this client's to revoke;
        // the response does not disclose that.
        if let Some(token_client) = claims.client_id.as_deref() {
            if token_client != client.client_id {
                tracing::warn!(
                    token_client = %token_client,
                    request_client = %client.client_id,
                    "oauth_revoke_client_mismatch"
                );
                return Ok(());
            }
        }

        let Ok(user_id) = claims.user_id() else {
            return Ok(());
        };

        match claims.token_type {
            TokenType::Refresh => {
                self.refresh_repo
                    .revoke(user_id, token)
                    .await
                    .map_err(|e| OAuthError::ServerError(e.to_string()))?;
                tracing::info!(user_id = %user_id, jti = %claims.jti, "refresh_token_revoked");
            }
            TokenType::Access => {
                let remaining = claims.remaining_seconds();
                if remaining > 0 {
                    if let Err(e) = self
                        .cache
                        .set_ex(&Self::denylist_key(&claims.jti), "revoked", remaining as u64)
                        .await
                    {
                        return Err(OAuthError::ServerError(e.to_string()));
                    }
                }
                tracing::info!(user_id = %user_id, jti = %claims.jti, "access_token_denylisted");
            }
            TokenType::TwoFactorPreAuth => {}
        }

        Ok(())
    }

    /// Denylist check used by the bearer-auth middleware
    pub async fn is_access_token_denylisted(&self, jti: &str) -> bool {
        match self.cache.exists(&Self::denylist_key(jti)).await {
            Ok(found) => found,
            Err(e) => {
                // Fail open: the denylist is a best-effort early cutoff on
                // top of short access-token lifetimes.
                tracing::warn!(error = %e, "denylist_check_failed");
                false
            }
        }
    }

    /// First-party logout: revoke the presented refresh token, always succeed
    pub async fn logout(&self, refresh_token: &str) {
        if let Ok(claims) = self.jwt.decode(refresh_token) {
            if claims.token_type == TokenType::Refresh {
                if let Ok(user_id) = claims.user_id() {
                    if let Err(e) = self.refresh_repo.revoke(user_id, refresh_token).await {
                        tracing::warn!(error = %e, "logout_revoke_failed");
                    }
                }
            }
        }
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }
}
