pub mod audit_log;
pub mod authorization_code;
pub mod consent;
pub mod group;
pub mod oauth_client;
pub mod organization;
pub mod permission;
pub mod refresh_token;
pub mod user;

pub use audit_log::AuditLogRepository;
pub use authorization_code::AuthorizationCodeRepository;
pub use consent::ConsentRepository;
pub use group::GroupRepository;
pub use oauth_client::OAuthClientRepository;
pub use organization::OrganizationRepository;
pub use permission::PermissionRepository;
pub use refresh_token::RefreshTokenRepository;
pub use user::UserRepository;

/// Postgres unique-violation class, translated to typed errors at this
/// boundary
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}
