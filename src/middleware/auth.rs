//! Bearer-token authentication middleware.
//!
//! Verifies the access token, rejects denylisted jtis, and injects an
//! [`AuthUser`] into request extensions for handlers to consume.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::error::AuthError;
use crate::services::token::TokenService;
use crate::utils::jwt::TokenType;

/// The authenticated principal for this request
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub org_id: Option<Uuid>,
    pub scopes: Vec<String>,
    pub client_id: Option<String>,
}

pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AuthError::InvalidToken)?;

    let claims = state.jwt_manager.decode(token)?;

    if claims.token_type != TokenType::Access {
        return Err(AuthError::InvalidToken);
    }

    // Revoked-but-unexpired access tokens sit on the jti denylist.
    let token_service = TokenService::new(
        state.pool.clone(),
        state.cache.clone(),
        state.jwt_manager.clone(),
        &state.config,
    );
    if token_service.is_access_token_denylisted(&claims.jti).await {
        tracing::info!(jti = %claims.jti, "access_token_denylisted_rejected");
        return Err(AuthError::InvalidToken);
    }

    let auth_user = AuthUser {
        user_id: claims.user_id()?,
        org_id: claims.org_id,
        scopes: claims.scopes(),
        client_id: claims.client_id.clone(),
    };

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}
