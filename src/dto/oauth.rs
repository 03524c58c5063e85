use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ClientType;

/// GET /oauth/authorize query parameters
#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub code_challenge: String,
    #[serde(default = "default_challenge_method")]
    pub code_challenge_method: String,
    pub nonce: Option<String>,
}

fn default_challenge_method() -> String {
    "S256".to_string()
}

/// POST /oauth/authorize consent form; hidden fields carry the original
/// authorization parameters through the consent screen
#[derive(Debug, Deserialize)]
pub struct ConsentForm {
    pub action: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub nonce: Option<String>,
    pub org_id: Option<Uuid>,
}

/// POST /oauth/token form body (RFC 6749 §4.1.3 / §6)
#[derive(Debug, Deserialize)]
pub struct TokenRequestForm {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

/// POST /oauth/revoke form body (RFC 7009)
#[derive(Debug, Deserialize)]
pub struct RevokeRequestForm {
    pub token: String,
    #[allow(dead_code)]
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterClientRequest {
    pub client_id: String,
    pub client_name: String,
    pub client_type: ClientType,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    #[serde(default = "default_true")]
    pub require_pkce: bool,
    #[serde(default = "default_true")]
    pub require_consent: bool,
    #[serde(default)]
    pub is_first_party: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct RegisterClientResponse {
    pub client_id: String,
    pub client_name: String,
    pub client_type: ClientType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
}

/// RFC 8414 authorization server metadata
#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub revocation_endpoint: String,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
    pub scopes_supported: Vec<String>,
}
