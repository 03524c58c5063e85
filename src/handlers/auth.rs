//! Identity endpoints: registration, verification, login, token refresh,
//! logout and password reset.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::config::AppState;
use crate::dto::auth::{
    LoginRequest, LogoutRequest, MessageResponse, RefreshRequest, RegisterRequest,
    RequestPasswordResetRequest, ResendVerificationRequest, ResetPasswordRequest,
    VerifyCodeRequest,
};
use crate::error::AuthError;
use crate::handlers::{auth_service, password_reset_service, registration_service, token_service};
use crate::services::password_reset::RESET_REQUESTED_MESSAGE;

pub async fn register_handler(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let result = registration_service(&state)
        .register(&payload.email, &payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn verify_code_handler(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    registration_service(&state)
        .verify_account(&payload.verification_token, &payload.code)
        .await?;

    Ok(Json(MessageResponse::new("Account verified successfully.")))
}

/// The response does not reveal whether the account exists or is already
/// verified.
pub async fn resend_verification_handler(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    registration_service(&state)
        .resend_verification(&payload.email)
        .await?;

    Ok(Json(MessageResponse::new(
        "If an unverified account with this email exists, a new code has been sent.",
    )))
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let outcome = auth_service(&state)
        .login(
            &payload.username,
            &payload.password,
            payload.code.as_deref(),
            payload.org_id,
            payload.session_id.as_deref(),
        )
        .await?;

    Ok(Json(outcome))
}

pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let response = token_service(&state)
        .refresh_first_party(&payload.refresh_token)
        .await?;

    Ok(Json(response))
}

/// Always succeeds, whatever state the presented token is in
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(payload): Json<LogoutRequest>,
) -> Json<MessageResponse> {
    auth_service(&state).logout(&payload.refresh_token).await;
    Json(MessageResponse::new("Logged out successfully"))
}

/// Invariant response whether or not the account exists
pub async fn request_password_reset_handler(
    State(state): State<AppState>,
    Json(payload): Json<RequestPasswordResetRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    password_reset_service(&state)
        .request_reset(&payload.email)
        .await?;

    Ok(Json(MessageResponse::new(RESET_REQUESTED_MESSAGE)))
}

pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    password_reset_service(&state)
        .confirm_reset(&payload.reset_token, &payload.code, &payload.new_password)
        .await?;

    Ok(Json(MessageResponse::new("Password updated successfully.")))
}
