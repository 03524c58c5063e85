use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Identity and token errors surfaced by the auth endpoints
#[allow(dead_code)]
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account not verified")]
    AccountNotVerified,

    #[error("Two-factor authentication required")]
    TwoFactorRequired { pre_auth_token: String },

    #[error("Two-factor verification failed")]
    TwoFactorVerification(String),

    #[error("Two-factor setup error")]
    TwoFactorSetup(String),

    #[error("Too many failed attempts")]
    TooManyAttempts,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid email format")]
    InvalidEmailFormat,

    #[error("Password does not meet requirements: {0}")]
    WeakPassword(String),

    #[error("Request body too large")]
    RequestEntityTooLarge,

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// RBAC errors surfaced by organization, group and permission operations
#[allow(dead_code)]
#[derive(Debug, thiserror::Error)]
pub enum RbacError {
    #[error("Organization not found")]
    OrganizationNotFound,

    #[error("User is not a member of the organization")]
    UserNotOrganizationMember,

    #[error("Insufficient organization permission")]
    InsufficientOrganizationPermission,

    #[error("Group not found")]
    GroupNotFound,

    #[error("Group name already exists in this organization")]
    DuplicateGroupName,

    #[error("User is already a member of the group")]
    GroupMemberAlreadyExists,

    #[error("User is not a member of the group")]
    NotGroupMember,

    #[error("Permission not found")]
    PermissionNotFound,

    #[error("Permission already exists")]
    DuplicatePermission,

    #[error("Permission already granted to group")]
    GroupPermissionAlreadyGranted,

    #[error("Permission not granted to group")]
    GroupPermissionNotGranted,

    #[error("Cannot remove the last owner of an organization")]
    LastOwnerRemoval,

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Canonical OAuth 2.0 errors (RFC 6749 §5.2), rendered as
/// `{error, error_description}` bodies
#[allow(dead_code)]
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("invalid_request")]
    InvalidRequest(String),

    #[error("invalid_client")]
    InvalidClient,

    #[error("invalid_grant")]
    InvalidGrant(String),

    #[error("unauthorized_client")]
    UnauthorizedClient,

    #[error("unsupported_grant_type")]
    UnsupportedGrantType(String),

    #[error("invalid_scope")]
    InvalidScope(String),

    #[error("access_denied")]
    AccessDenied,

    #[error("insufficient_scope")]
    InsufficientScope,

    #[error("unsupported_response_type")]
    UnsupportedResponseType(String),

    #[error("server_error")]
    ServerError(String),
}

impl OAuthError {
    /// The canonical error code string for redirect parameters and bodies
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnauthorizedClient => "unauthorized_client",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::InsufficientScope => "insufficient_scope",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    /// Human-readable description, when one exists
    pub fn description(&self) -> Option<&str> {
        match self {
            OAuthError::InvalidRequest(d)
            | OAuthError::InvalidGrant(d)
            | OAuthError::UnsupportedGrantType(d)
            | OAuthError::InvalidScope(d)
            | OAuthError::UnsupportedResponseType(d)
            | OAuthError::ServerError(d) => Some(d.as_str()),
            _ => None,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// OAuth error body per RFC 6749 §5.2
#[derive(Serialize)]
pub struct OAuthErrorResponse {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Two shapes bypass the generic error body.
        match &self {
            AuthError::TwoFactorRequired { pre_auth_token } => {
                #[derive(Serialize)]
                struct TwoFactorRequiredBody {
                    error: &'static str,
                    message: &'static str,
                    pre_auth_token: String,
                    expires_in: u64,
                }
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(TwoFactorRequiredBody {
                        error: "two_factor_required",
                        message: "Two-factor authentication required",
                        pre_auth_token: pre_auth_token.clone(),
                        expires_in: 300,
                    }),
                )
                    .into_response();
            }
            AuthError::RequestEntityTooLarge => {
                return (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    Json(serde_json::json!({ "detail": "Request body too large" })),
                )
                    .into_response();
            }
            _ => {}
        }

        let (status, error_type) = match &self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AuthError::AccountNotVerified => (StatusCode::FORBIDDEN, "account_not_verified"),
            AuthError::TwoFactorRequired { .. } => unreachable!(),
            AuthError::TwoFactorVerification(_) => (StatusCode::FORBIDDEN, "two_factor_failed"),
            AuthError::TwoFactorSetup(_) => (StatusCode::BAD_REQUEST, "two_factor_setup"),
            AuthError::TooManyAttempts => (StatusCode::TOO_MANY_REQUESTS, "too_many_attempts"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            AuthError::UserAlreadyExists => (StatusCode::CONFLICT, "user_exists"),
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, "user_not_found"),
            AuthError::InvalidEmailFormat => (StatusCode::BAD_REQUEST, "invalid_email"),
            AuthError::WeakPassword(_) => (StatusCode::BAD_REQUEST, "weak_password"),
            AuthError::RequestEntityTooLarge => unreachable!(),
            AuthError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let message = match &self {
            AuthError::TwoFactorVerification(detail) | AuthError::TwoFactorSetup(detail) => {
                detail.clone()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            status_code: status.as_u16(),
        });

        let mut response = (status, body).into_response();

        // Challenge header on credential failures
        if matches!(
            self,
            AuthError::InvalidCredentials | AuthError::TokenExpired | AuthError::InvalidToken
        ) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }

        response
    }
}

impl IntoResponse for RbacError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            RbacError::OrganizationNotFound => (StatusCode::NOT_FOUND, "organization_not_found"),
            RbacError::UserNotOrganizationMember => (StatusCode::FORBIDDEN, "not_org_member"),
            RbacError::InsufficientOrganizationPermission => {
                (StatusCode::FORBIDDEN, "insufficient_org_permission")
            }
            RbacError::GroupNotFound => (StatusCode::NOT_FOUND, "group_not_found"),
            RbacError::DuplicateGroupName => (StatusCode::CONFLICT, "duplicate_group_name"),
            RbacError::GroupMemberAlreadyExists => (StatusCode::CONFLICT, "group_member_exists"),
            RbacError::NotGroupMember => (StatusCode::NOT_FOUND, "not_group_member"),
            RbacError::PermissionNotFound => (StatusCode::NOT_FOUND, "permission_not_found"),
            RbacError::DuplicatePermission => (StatusCode::CONFLICT, "duplicate_permission"),
            RbacError::GroupPermissionAlreadyGranted => {
                (StatusCode::CONFLICT, "permission_already_granted")
            }
            RbacError::GroupPermissionNotGranted => {
                (StatusCode::NOT_FOUND, "permission_not_granted")
            }
            RbacError::LastOwnerRemoval => (StatusCode::CONFLICT, "last_owner_removal"),
            RbacError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            OAuthError::InvalidClient => StatusCode::UNAUTHORIZED,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };

        let body = Json(OAuthErrorResponse {
            error: self.code(),
            error_description: self.description().map(String::from),
        });

        let mut response = (status, body).into_response();

        // RFC 6749 §5.2: client auth failure carries a challenge
        if matches!(self, OAuthError::InvalidClient) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static(r#"Basic realm="OAuth 2.0""#),
            );
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_error_codes_are_canonical() {
        assert_eq!(OAuthError::InvalidRequest(String::new()).code(), "invalid_request");
        assert_eq!(OAuthError::InvalidClient.code(), "invalid_client");
        assert_eq!(OAuthError::InvalidGrant(String::new()).code(), "invalid_grant");
        assert_eq!(OAuthError::UnauthorizedClient.code(), "unauthorized_client");
        assert_eq!(
            OAuthError::UnsupportedGrantType(String::new()).code(),
            "unsupported_grant_type"
        );
        assert_eq!(OAuthError::InvalidScope(String::new()).code(), "invalid_scope");
        assert_eq!(OAuthError::AccessDenied.code(), "access_denied");
        assert_eq!(OAuthError::InsufficientScope.code(), "insufficient_scope");
        assert_eq!(
            OAuthError::UnsupportedResponseType(String::new()).code(),
            "unsupported_response_type"
        );
        assert_eq!(OAuthError::ServerError(String::new()).code(), "server_error");
    }

    #[test]
    fn test_invalid_client_status_and_challenge() {
        let response = OAuthError::InvalidClient.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            r#"Basic realm="OAuth 2.0""#
        );
    }

    #[test]
    fn test_invalid_credentials_is_401_with_bearer_challenge() {
        let response = AuthError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn test_request_too_large_is_413() {
        let response = AuthError::RequestEntityTooLarge.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_last_owner_removal_is_conflict() {
        let response = RbacError::LastOwnerRemoval.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
