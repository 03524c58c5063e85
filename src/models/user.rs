use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User account.
///
/// Email is case-folded on write and on lookup. The password hash is never
/// serialized and never logged.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Persisted refresh token row keyed by `(user_id, jti)`
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub token: String,
    pub jti: String,
    pub client_id: Option<String>,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}
