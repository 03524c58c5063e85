//! Login orchestration.
//!
//! Two-step login: valid credentials first trigger an emailed code; the
//! code then unlocks organization resolution. If TOTP is configured the
//! email code step is followed by a pre-auth token whose exchange with a
//! valid TOTP mints the real tokens. Organization resolution: one org
//! scopes the tokens directly, several return a selection payload backed by
//! a short-lived login session, none yields user-scoped tokens.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::AuthError;
use crate::models::{User, UserOrganization};
use crate::repositories::{OrganizationRepository, UserRepository};
use crate::services::email::EmailService;
use crate::services::password::PasswordService;
use crate::services::token::{TokenResponse, TokenService};
use crate::services::two_factor::TwoFactorService;
use crate::utils::codes::{constant_time_compare, generate_opaque_token, generate_verification_code};
use crate::utils::email::normalize_email;

/// Login sessions bridging the org-selection step live this long
const LOGIN_SESSION_TTL_SECONDS: u64 = 300;

/// Purpose label for the TOTP attempt counter
const TOTP_LOGIN_PURPOSE: &str = "login";

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LoginOutcome {
    CodeSent {
        message: String,
        email: String,
        user_id: Uuid,
        requires_code: bool,
        expires_in: u64,
    },
    OrganizationSelection {
        message: String,
        organizations: Vec<UserOrganization>,
        session_id: String,
    },
    Tokens(TokenResponse),
}

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    org_repo: OrganizationRepository,
    cache: CacheStore,
    password: PasswordService,
    token: TokenService,
    two_factor: TwoFactorService,
    email: EmailService,
    two_factor_enabled: bool,
    login_code_ttl_seconds: u64,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        cache: CacheStore,
        password: PasswordService,
        token: TokenService,
        two_factor: TwoFactorService,
        email: EmailService,
        config: &Config,
    ) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            org_repo: OrganizationRepository::new(pool),
            cache,
            password,
            token,
            two_factor,
            email,
            two_factor_enabled: config.two_factor_enabled,
            login_code_ttl_seconds: config.login_code_ttl_seconds,
        }
    }

    fn login_code_key(user_id: Uuid) -> String {
        format!("2FA:{}:login", user_id)
    }

    fn login_session_key(session_id: &str) -> String {
        format!("LOGIN_SESSION:{}", session_id)
    }

    /// Login entry point covering both steps and org selection.
    ///
    /// `session_id` resumes an org-selection step without re-verifying
    /// credentials; otherwise email and password are always checked.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        code: Option<&str>,
        org_id: Option<Uuid>,
        session_id: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        // Org selection resumption: the session proves a completed step 2.
        if let (Some(session_id), Some(org_id)) = (session_id, org_id) {
            return self.complete_org_selection(session_id, org_id).await;
        }

        let user = self.authenticate_credentials(username, password).await?;

        match code {
            None => self.send_login_code(&user).await,
            Some(code) => {
                self.consume_login_code(&user, code).await?;

                // Email factor done; TOTP next if the user has it configured.
                if self.two_factor_enabled && self.two_factor.is_enabled(user.id).await? {
                    let pre_auth_token = self.token.create_2fa_token(user.id)?;
                    tracing::info!(user_id = %user.id, "login_totp_required");
                    return Err(AuthError::TwoFactorRequired { pre_auth_token });
                }

                self.resolve_organization(user.id, org_id).await
            }
        }
    }

    /// Exchange a pre-auth token and TOTP code for full tokens
    pub async fn login_2fa_challenge(
        &self,
        pre_auth_token: &str,
        code: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let claims = self.token.jwt().decode(pre_auth_token)?;
        if claims.token_type != crate::utils::jwt::TokenType::TwoFactorPreAuth {
            return Err(AuthError::InvalidToken);
        }
        let user_id = claims.user_id()?;

        self.two_factor
            .validate_challenge(user_id, code, TOTP_LOGIN_PURPOSE)
            .await?;

        self.resolve_organization(user_id, None).await
    }

    /// Revoke the presented refresh token; always succeeds
    pub async fn logout(&self, refresh_token: &str) {
        self.token.logout(refresh_token).await;
    }

    async fn authenticate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let email = normalize_email(username);

        let Some(user) = self.user_repo.find_by_email(&email).await? else {
            tracing::debug!("login_unknown_email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.password.verify(password, &user.password_hash).await? {
            tracing::debug!(user_id = %user.id, "login_bad_password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_verified {
            tracing::info!(user_id = %user.id, "login_account_not_verified");
            return Err(AuthError::AccountNotVerified);
        }

        if !user.is_active {
            tracing::info!(user_id = %user.id, "login_account_inactive");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    async fn send_login_code(&self, user: &User) -> Result<LoginOutcome, AuthError> {
        let login_code = generate_verification_code();

        self.cache
            .set_ex(
                &Self::login_code_key(user.id),
                &login_code,
                self.login_code_ttl_seconds,
            )
            .await
            .map_err(AuthError::InternalError)?;

        self.email
            .send_code(&user.email, &login_code, "login verification")
            .await;

        tracing::info!(user_id = %user.id, "login_code_sent");
        Ok(LoginOutcome::CodeSent {
            message: "Login code sent to your email".to_string(),
            email: user.email.clone(),
            user_id: user.id,
            requires_code: true,
            expires_in: self.login_code_ttl_seconds,
        })
    }

    async fn consume_login_code(&self, user: &User, code: &str) -> Result<(), AuthError> {
        let key = Self::login_code_key(user.id);

        let stored = self
            .cache
            .get(&key)
            .await
            .map_err(AuthError::InternalError)?;

        let Some(stored) = stored else {
            tracing::debug!(user_id = %user.id, "login_code_expired");
            return Err(AuthError::InvalidToken);
        };

        if !constant_time_compare(code, &stored) {
            tracing::debug!(user_id = %user.id, "login_code_mismatch");
            return Err(AuthError::InvalidToken);
        }

        self.cache.delete(&key).await.map_err(AuthError::InternalError)?;
        tracing::debug!(user_id = %user.id, "login_code_verified");
        Ok(())
    }

    /// Organization resolution after all factors pass
    async fn resolve_organization(
        &self,
        user_id: Uuid,
        requested_org: Option<Uuid>,
    ) -> Result<LoginOutcome, AuthError> {
        let organizations = self
            .org_repo
            .list_for_user(user_id)
            .await
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("{}", e)))?;

        let org_id = match (requested_org, organizations.len()) {
            (Some(requested), _) => {
                if !organizations.iter().any(|org| org.id == requested) {
                    tracing::warn!(user_id = %user_id, org_id = %requested, "login_org_not_member");
                    return Err(AuthError::InvalidCredentials);
                }
                Some(requested)
            }
            (None, 0) => None,
            (None, 1) => Some(organizations[0].id),
            (None, _) => {
                // Several orgs: hand back a selection payload with a session
                // so the selection call need not re-present credentials.
                let session_id = generate_opaque_token();
                self.cache
                    .set_ex(
                        &Self::login_session_key(&session_id),
                        &user_id.to_string(),
                        LOGIN_SESSION_TTL_SECONDS,
                    )
                    .await
                    .map_err(AuthError::InternalError)?;

                tracing::info!(
                    user_id = %user_id,
                    organization_count = organizations.len(),
                    "login_org_selection_required"
                );
                return Ok(LoginOutcome::OrganizationSelection {
                    message: "Select an organization to continue".to_string(),
                    organizations,
                    session_id,
                });
            }
        };

        self.grant_tokens(user_id, org_id).await
    }

    async fn complete_org_selection(
        &self,
        session_id: &str,
        org_id: Uuid,
    ) -> Result<LoginOutcome, AuthError> {
        let key = Self::login_session_key(session_id);

        let user_id = self
            .cache
            .get(&key)
            .await
            .map_err(AuthError::InternalError)?
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .ok_or(AuthError::InvalidToken)?;

        let is_member = self
            .org_repo
            .is_member(user_id, org_id)
            .await
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("{}", e)))?;
        if !is_member {
            tracing::warn!(user_id = %user_id, org_id = %org_id, "login_selection_org_not_member");
            return Err(AuthError::InvalidCredentials);
        }

        self.cache.delete(&key).await.map_err(AuthError::InternalError)?;
        self.grant_tokens(user_id, Some(org_id)).await
    }

    async fn grant_tokens(
        &self,
        user_id: Uuid,
        org_id: Option<Uuid>,
    ) -> Result<LoginOutcome, AuthError> {
        let response = self.token.create_token_response(user_id, org_id).await?;

        if let Err(e) = self.user_repo.record_login(user_id).await {
            tracing::warn!(error = %e, user_id = %user_id, "login_timestamp_update_failed");
        }

        tracing::info!(user_id = %user_id, org_id = ?org_id, "login_complete");
        Ok(LoginOutcome::Tokens(response))
    }
}
