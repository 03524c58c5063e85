//! User consent for OAuth clients: skip rules, incremental consent checks,
//! and persisted decisions.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::{ConsentRecord, ConsentStatus};
use crate::repositories::ConsentRepository;

#[derive(Clone)]
pub struct ConsentService {
    repo: ConsentRepository,
}

impl ConsentService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: ConsentRepository::new(pool),
        }
    }

    /// First-party clients that do not insist on consent skip the screen
    pub fn should_skip_consent(is_first_party: bool, require_consent: bool) -> bool {
        is_first_party && !require_consent
    }

    /// Check whether prior consent covers the requested scopes.
    ///
    /// Incremental consent: any requested scope outside the prior grant
    /// requires a fresh consent prompt.
    pub async fn check_consent(
        &self,
        user_id: Uuid,
        client_id: &str,
        organization_id: Option<Uuid>,
        requested_scopes: &[String],
    ) -> Result<ConsentStatus, OAuthError> {
        let existing = self.repo.find(user_id, client_id, organization_id).await?;

        let status = match existing {
            None => ConsentStatus {
                has_consent: false,
                granted_scopes: None,
                needs_new_consent: true,
            },
            Some(record) => {
                let covered = requested_scopes
                    .iter()
                    .all(|scope| record.granted_scopes.contains(scope));
                ConsentStatus {
                    has_consent: covered,
                    granted_scopes: Some(record.granted_scopes),
                    needs_new_consent: !covered,
                }
            }
        };

        tracing::info!(
            user_id = %user_id,
            client_id = %client_id,
            has_consent = status.has_consent,
            needs_new_consent = status.needs_new_consent,
            "consent_checked"
        );
        Ok(status)
    }

    /// Persist an approval; merges with any prior grant
    pub async fn save_consent(
        &self,
        user_id: Uuid,
        client_id: &str,
        organization_id: Option<Uuid>,
        granted_scopes: &[String],
    ) -> Result<ConsentRecord, OAuthError> {
        let record = self
            .repo
            .upsert(user_id, client_id, organization_id, granted_scopes)
            .await?;

        tracing::info!(
            user_id = %user_id,
            client_id = %client_id,
            granted_count = record.granted_scopes.len(),
            "consent_saved"
        );
        Ok(record)
    }

    /// Remove a consent record; false when none existed
    pub async fn revoke_consent(
        &self,
        user_id: Uuid,
        client_id: &str,
        organization_id: Option<Uuid>,
    ) -> Result<bool, OAuthError> {
        let revoked = self.repo.delete(user_id, client_id, organization_id).await?;

        if revoked {
            tracing::info!(user_id = %user_id, client_id = %client_id, "consent_revoked");
        } else {
            tracing::warn!(
                user_id = %user_id,
                client_id = %client_id,
                "consent_revoke_nothing_to_revoke"
            );
        }
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_skip_consent_rules() {
        assert!(ConsentService::should_skip_consent(true, false));
        assert!(!ConsentService::should_skip_consent(true, true));
        assert!(!ConsentService::should_skip_consent(false, false));
        assert!(!ConsentService::should_skip_consent(false, true));
    }
}
