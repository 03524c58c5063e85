//! Opaque-token store: short-lived `{prefix}:{token} → "{user_id}:{code}"`
//! mappings with TTL.
//!
//! The opaque token is what clients hold; user ids never appear in
//! verification, reset or login flows, which closes off account takeover by
//! id enumeration. Code comparison is constant-time.

use uuid::Uuid;

use crate::cache::CacheStore;
use crate::utils::codes::{constant_time_compare, generate_opaque_token};

/// Key prefix for email verification codes
pub const PREFIX_VERIFY: &str = "verify_token";
/// Key prefix for password reset codes
pub const PREFIX_RESET: &str = "reset_token";

#[derive(Clone)]
pub struct OpaqueTokenStore {
    cache: CacheStore,
}

impl OpaqueTokenStore {
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }

    /// Store a code under a fresh opaque token, returning the token
    pub async fn store(
        &self,
        user_id: Uuid,
        code: &str,
        prefix: &str,
        ttl_seconds: u64,
    ) -> anyhow::Result<String> {
        let token = generate_opaque_token();
        let key = format!("{}:{}", prefix, token);
        let value = format!("{}:{}", user_id, code);

        self.cache.set_ex(&key, &value, ttl_seconds).await?;

        tracing::debug!(prefix, ttl_seconds, "opaque_token_stored");
        Ok(token)
    }

    /// Verify a code against the stored mapping.
    ///
    /// Returns the user id when the token exists and the code matches in
    /// constant time. Expired tokens, malformed values and mismatched codes
    /// all yield `None` and are indistinguishable to the caller.
    pub async fn verify(
        &self,
        token: &str,
        code: &str,
        prefix: &str,
    ) -> anyhow::Result<Option<Uuid>> {
        let key = format!("{}:{}", prefix, token);

        let Some(stored) = self.cache.get(&key).await? else {
            tracing::debug!(prefix, "opaque_token_not_found");
            return Ok(None);
        };

        let Some((user_id_str, stored_code)) = stored.split_once(':') else {
            tracing::warn!(prefix, "opaque_token_malformed_value");
            return Ok(None);
        };

        if !constant_time_compare(code, stored_code) {
            tracing::debug!(prefix, "opaque_token_code_mismatch");
            return Ok(None);
        }

        match Uuid::parse_str(user_id_str) {
            Ok(user_id) => Ok(Some(user_id)),
            Err(_) => {
                tracing::warn!(prefix, "opaque_token_invalid_user_id");
                Ok(None)
            }
        }
    }

    /// Idempotent delete, called after successful verification
    pub async fn delete(&self, token: &str, prefix: &str) -> anyhow::Result<()> {
        let key = format!("{}:{}", prefix, token);
        self.cache.delete(&key).await
    }
}
