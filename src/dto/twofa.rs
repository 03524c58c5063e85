use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TwoFactorVerifyRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorLoginRequest {
    pub pre_auth_token: String,
    pub code: String,
}
