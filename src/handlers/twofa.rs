//! TOTP second-factor endpoints.

use axum::{extract::State, response::IntoResponse, Extension, Json};

use crate::config::AppState;
use crate::dto::auth::MessageResponse;
use crate::dto::twofa::{TwoFactorLoginRequest, TwoFactorVerifyRequest};
use crate::error::AuthError;
use crate::handlers::{auth_service, two_factor_service};
use crate::middleware::AuthUser;

pub async fn setup_totp_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AuthError> {
    let setup = two_factor_service(&state).setup(auth_user.user_id).await?;
    Ok(Json(setup))
}

pub async fn verify_totp_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<TwoFactorVerifyRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    two_factor_service(&state)
        .verify_and_enable(auth_user.user_id, &payload.code)
        .await?;

    Ok(Json(MessageResponse::new("2FA enabled successfully.")))
}

pub async fn disable_totp_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<MessageResponse>, AuthError> {
    two_factor_service(&state).disable(auth_user.user_id).await?;
    Ok(Json(MessageResponse::new("2FA disabled successfully.")))
}

/// Exchange a pre-auth token and TOTP code for full tokens
pub async fn login_2fa_handler(
    State(state): State<AppState>,
    Json(payload): Json<TwoFactorLoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let outcome = auth_service(&state)
        .login_2fa_challenge(&payload.pre_auth_token, &payload.code)
        .await?;

    Ok(Json(outcome))
}
