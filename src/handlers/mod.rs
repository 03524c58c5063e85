pub mod auth;
pub mod authorization;
pub mod group;
pub mod oauth;
pub mod organization;
pub mod twofa;

use crate::config::AppState;
use crate::services::auth::AuthService;
use crate::services::authorization::AuthorizationService;
use crate::services::authorization_code::AuthorizationCodeService;
use crate::services::consent::ConsentService;
use crate::services::group::GroupService;
use crate::services::oauth_client::OAuthClientService;
use crate::services::organization::OrganizationService;
use crate::services::password::PasswordService;
use crate::services::password_reset::PasswordResetService;
use crate::services::registration::RegistrationService;
use crate::services::scope::ScopeService;
use crate::services::token::TokenService;
use crate::services::two_factor::TwoFactorService;

// Handlers assemble services from shared state per request; construction is
// a handful of pool clones.

pub(crate) fn password_service(state: &AppState) -> PasswordService {
    PasswordService::new(!state.config.debug)
}

pub(crate) fn token_service(state: &AppState) -> TokenService {
    TokenService::new(
        state.pool.clone(),
        state.cache.clone(),
        state.jwt_manager.clone(),
        &state.config,
    )
}

pub(crate) fn two_factor_service(state: &AppState) -> TwoFactorService {
    TwoFactorService::new(
        state.pool.clone(),
        state.cache.clone(),
        state.secret_cipher.clone(),
    )
}

pub(crate) fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        state.pool.clone(),
        state.cache.clone(),
        password_service(state),
        token_service(state),
        two_factor_service(state),
        state.email.clone(),
        &state.config,
    )
}

pub(crate) fn registration_service(state: &AppState) -> RegistrationService {
    RegistrationService::new(
        state.pool.clone(),
        state.cache.clone(),
        password_service(state),
        state.email.clone(),
        &state.config,
    )
}

pub(crate) fn password_reset_service(state: &AppState) -> PasswordResetService {
    PasswordResetService::new(
        state.pool.clone(),
        state.cache.clone(),
        password_service(state),
        state.email.clone(),
        &state.config,
    )
}

pub(crate) fn authorization_service(state: &AppState) -> AuthorizationService {
    AuthorizationService::new(
        state.pool.clone(),
        state.cache.clone(),
        &state.config,
        state.metrics.clone(),
        state.audit.clone(),
    )
}

pub(crate) fn organization_service(state: &AppState) -> OrganizationService {
    OrganizationService::new(state.pool.clone(), authorization_service(state))
}

pub(crate) fn group_service(state: &AppState) -> GroupService {
    GroupService::new(state.pool.clone(), authorization_service(state))
}

pub(crate) fn oauth_client_service(state: &AppState) -> OAuthClientService {
    OAuthClientService::new(state.pool.clone())
}

pub(crate) fn scope_service(state: &AppState) -> ScopeService {
    ScopeService::new(state.pool.clone())
}

pub(crate) fn consent_service(state: &AppState) -> ConsentService {
    ConsentService::new(state.pool.clone())
}

pub(crate) fn authorization_code_service(state: &AppState) -> AuthorizationCodeService {
    AuthorizationCodeService::new(state.pool.clone())
}
