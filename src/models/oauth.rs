use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// OAuth client type: public clients carry no secret, confidential clients
/// must authenticate with one. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Public,
    Confidential,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Public => "public",
            ClientType::Confidential => "confidential",
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for ClientType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ClientType {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)? {
            "public" => Ok(ClientType::Public),
            "confidential" => Ok(ClientType::Confidential),
            other => Err(format!("invalid client type: {}", other).into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for ClientType {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Registered OAuth client
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OAuthClient {
    pub id: Uuid,
    pub client_id: String,
    pub client_name: String,
    pub client_type: ClientType,
    #[serde(skip_serializing)]
    pub client_secret_hash: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub require_pkce: bool,
    pub require_consent: bool,
    pub is_first_party: bool,
    pub created_at: DateTime<Utc>,
}

impl OAuthClient {
    pub fn is_public(&self) -> bool {
        self.client_type == ClientType::Public
    }

    pub fn is_confidential(&self) -> bool {
        self.client_type == ClientType::Confidential
    }

    /// Exact string membership; no wildcards, no prefixes
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }
}

/// Single-use authorization code with its PKCE binding.
///
/// Immutable after issue except the `consumed` flag.
#[derive(Debug, Clone, FromRow)]
pub struct AuthorizationCode {
    pub id: Uuid,
    pub code: String,
    pub client_id: String,
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub nonce: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Persisted consent decision; scopes merge on re-consent
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConsentRecord {
    pub user_id: Uuid,
    pub client_id: String,
    pub organization_id: Option<Uuid>,
    pub granted_scopes: Vec<String>,
    pub granted_at: DateTime<Utc>,
}

/// Outcome of a consent check for a set of requested scopes
#[derive(Debug, Clone, Serialize)]
pub struct ConsentStatus {
    pub has_consent: bool,
    pub granted_scopes: Option<Vec<String>>,
    pub needs_new_consent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(redirect_uris: Vec<&str>) -> OAuthClient {
        OAuthClient {
            id: Uuid::new_v4(),
            client_id: "cid".to_string(),
            client_name: "Test".to_string(),
            client_type: ClientType::Public,
            client_secret_hash: None,
            redirect_uris: redirect_uris.into_iter().map(String::from).collect(),
            allowed_scopes: vec![],
            require_pkce: true,
            require_consent: true,
            is_first_party: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_redirect_uri_exact_match_only() {
        let c = client(vec!["https://cb", "https://app.example.com/callback"]);
        assert!(c.has_redirect_uri("https://cb"));
        assert!(!c.has_redirect_uri("https://cb/"));
        assert!(!c.has_redirect_uri("https://cb?x=1"));
        assert!(!c.has_redirect_uri("https://app.example.com"));
    }

    #[test]
    fn test_code_expiry_boundary() {
        let now = Utc::now();
        let code = AuthorizationCode {
            id: Uuid::new_v4(),
            code: "c".to_string(),
            client_id: "cid".to_string(),
            user_id: Uuid::new_v4(),
            organization_id: None,
            redirect_uri: "https://cb".to_string(),
            scopes: vec![],
            code_challenge: String::new(),
            code_challenge_method: "S256".to_string(),
            nonce: None,
            expires_at: now,
            consumed: false,
            created_at: now,
        };

        // Rejected exactly at expires_at, accepted just before.
        assert!(code.is_expired(now));
        assert!(!code.is_expired(now - chrono::Duration::milliseconds(1)));
    }
}
