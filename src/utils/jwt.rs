//! JWT signing and verification.
//!
//! All tokens are HMAC-signed with the process secret. The algorithm
//! allowlist is fixed when the manager is constructed; a token whose header
//! names any other algorithm fails verification as `InvalidToken`.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AuthError;

/// Minimum secret length in bytes, enforced at startup
pub const MIN_SECRET_LENGTH: usize = 32;

/// Token type discriminator carried in the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(rename = "access")]
    Access,
    #[serde(rename = "refresh")]
    Refresh,
    #[serde(rename = "2fa_pre_auth")]
    TwoFactorPreAuth,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
            TokenType::TwoFactorPreAuth => write!(f, "2fa_pre_auth"),
        }
    }
}

/// Claims carried by every token minted by this service.
///
/// OAuth-specific claims (`scope`, `client_id`, `azp`, `aud`) are only set on
/// tokens minted through the OAuth flow; first-party session tokens carry the
/// subject, type and org context alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer
    pub iss: String,
    /// Subject - user id
    pub sub: String,
    /// Audience - resource servers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Vec<String>>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// JWT id, unique per token; keys refresh-token rows and the denylist
    pub jti: String,
    /// Token type discriminator
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Space-separated granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// OAuth client identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Authorized party (same as client_id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    /// Organization scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,
}

impl Claims {
    /// Start a claim set with a fresh `jti`; `iat`/`exp` are stamped at signing
    pub fn new(issuer: &str, subject: Uuid, token_type: TokenType) -> Self {
        Self {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            aud: None,
            iat: 0,
            exp: 0,
            jti: Uuid::new_v4().to_string(),
            token_type,
            scope: None,
            client_id: None,
            azp: None,
            org_id: None,
        }
    }

    /// Parse the subject as a user id
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)
    }

    /// Scopes as a list (empty when the claim is absent)
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Seconds until expiry; zero if already expired
    pub fn remaining_seconds(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }
}

/// JWT manager holding the signing secret and the fixed algorithm set
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    algorithm: Algorithm,
    validation: Arc<Validation>,
}

impl JwtManager {
    /// Create a manager from the process secret and the configured algorithm
    /// name. Only HMAC algorithms are accepted; the secret must be at least
    /// 32 bytes.
    pub fn new(secret: &str, algorithm: &str) -> Result<Self, AuthError> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(AuthError::InternalError(anyhow::anyhow!(
                "JWT secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }

        let algorithm = match algorithm {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => {
                return Err(AuthError::InternalError(anyhow::anyhow!(
                    "Unsupported JWT algorithm: {}",
                    other
                )))
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.validate_aud = false;

        Ok(Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            algorithm,
            validation: Arc::new(validation),
        })
    }

    /// Stamp `iat`/`exp` and sign
    pub fn create(&self, mut claims: Claims, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        claims.iat = now.timestamp();
        claims.exp = (now + ttl).timestamp();

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!("Token signing failed: {}", e)))
    }

    /// Verify signature and expiry; never returns partial claims.
    ///
    /// Expired tokens surface as `TokenExpired`; every other failure,
    /// including a foreign header algorithm, is `InvalidToken`.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-key-0123456789abcdef0123456789";

    fn manager() -> JwtManager {
        JwtManager::new(SECRET, "HS256").unwrap()
    }

    #[test]
    fn test_new_rejects_short_secret() {
        assert!(JwtManager::new("too-short", "HS256").is_err());
    }

    #[test]
    fn test_new_rejects_unknown_algorithm() {
        assert!(JwtManager::new(SECRET, "RS256").is_err());
        assert!(JwtManager::new(SECRET, "none").is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mgr = manager();
        let user_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();

        let mut claims = Claims::new("https://auth.example.test", user_id, TokenType::Access);
        claims.scope = Some("activity:create activity:read".to_string());
        claims.client_id = Some("web-app".to_string());
        claims.azp = Some("web-app".to_string());
        claims.org_id = Some(org_id);

        let token = mgr.create(claims, Duration::minutes(15)).unwrap();
        let decoded = mgr.decode(&token).unwrap();

        assert_eq!(decoded.user_id().unwrap(), user_id);
        assert_eq!(decoded.token_type, TokenType::Access);
        assert_eq!(decoded.org_id, Some(org_id));
        assert_eq!(
            decoded.scopes(),
            vec!["activity:create".to_string(), "activity:read".to_string()]
        );
        assert!(decoded.exp > decoded.iat);
    }

    #[test]
    fn test_expired_token_fails_with_token_expired() {
        let mgr = manager();
        let claims = Claims::new("iss", Uuid::new_v4(), TokenType::Access);
        let token = mgr.create(claims, Duration::seconds(-10)).unwrap();

        assert!(matches!(mgr.decode(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_tampered_token_fails_with_invalid_token() {
        let mgr = manager();
        let claims = Claims::new("iss", Uuid::new_v4(), TokenType::Refresh);
        let token = mgr.create(claims, Duration::days(1)).unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('a') { 'b' } else { 'a' });

        assert!(matches!(mgr.decode(&tampered), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let mgr = manager();
        let other =
            JwtManager::new("another-secret-key-0123456789abcdef012345678", "HS256").unwrap();

        let claims = Claims::new("iss", Uuid::new_v4(), TokenType::Access);
        let token = other.create(claims, Duration::minutes(5)).unwrap();

        assert!(matches!(mgr.decode(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_foreign_header_algorithm_fails() {
        // Same secret, different header algorithm: outside the allowlist.
        let hs256 = manager();
        let hs384 = JwtManager::new(SECRET, "HS384").unwrap();

        let claims = Claims::new("iss", Uuid::new_v4(), TokenType::Access);
        let token = hs384.create(claims, Duration::minutes(5)).unwrap();

        assert!(matches!(hs256.decode(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_token_type_serialization() {
        let mgr = manager();
        let claims = Claims::new("iss", Uuid::new_v4(), TokenType::TwoFactorPreAuth);
        let token = mgr.create(claims, Duration::minutes(5)).unwrap();
        let decoded = mgr.decode(&token).unwrap();
        assert_eq!(decoded.token_type, TokenType::TwoFactorPreAuth);
    }

    #[test]
    fn test_jti_unique_per_claim_set() {
        let a = Claims::new("iss", Uuid::new_v4(), TokenType::Refresh);
        let b = Claims::new("iss", Uuid::new_v4(), TokenType::Refresh);
        assert_ne!(a.jti, b.jti);
    }
}
