//! Scope service: the bridge between RBAC permissions and OAuth scopes.
//!
//! Permissions and scopes share the canonical `resource:action` form, so a
//! scope grant is exactly a permission the user currently holds.

use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::repositories::{OrganizationRepository, PermissionRepository};

#[derive(Clone)]
pub struct ScopeService {
    org_repo: OrganizationRepository,
    perm_repo: PermissionRepository,
}

impl ScopeService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            org_repo: OrganizationRepository::new(pool.clone()),
            perm_repo: PermissionRepository::new(pool),
        }
    }

    /// Split a space-separated scope string, dropping empties and duplicates
    pub fn parse_scope_string(scope: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        scope
            .split_whitespace()
            .filter(|s| seen.insert(s.to_string()))
            .map(String::from)
            .collect()
    }

    /// Grant the intersection of three sets: requested ∩ client-allowed ∩
    /// permissions the user currently holds in the organization.
    ///
    /// An empty intersection surfaces upstream as `insufficient_scope`.
    pub async fn validate_and_grant(
        &self,
        requested: &[String],
        client_allowed: &[String],
        user_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> Result<Vec<String>, OAuthError> {
        let allowed: HashSet<&str> = client_allowed.iter().map(String::as_str).collect();

        let user_permissions: HashSet<String> = match organization_id {
            Some(org_id) => {
                let is_member = self
                    .org_repo
                    .is_member(user_id, org_id)
                    .await
                    .map_err(|e| OAuthError::ServerError(e.to_string()))?;
                if !is_member {
                    HashSet::new()
                } else {
                    self.perm_repo
                        .get_user_permissions(user_id, org_id)
                        .await
                        .map_err(|e| OAuthError::ServerError(e.to_string()))?
                        .into_iter()
                        .map(|grant| grant.canonical())
                        .collect()
                }
            }
            // No organization context: nothing beyond client-allowed can be
            // granted from RBAC; user-scoped tokens carry no org permissions.
            None => HashSet::new(),
        };

        let granted: Vec<String> = requested
            .iter()
            .filter(|scope| allowed.contains(scope.as_str()))
            .filter(|scope| {
                organization_id.is_none() || user_permissions.contains(scope.as_str())
            })
            .cloned()
            .collect();

        tracing::debug!(
            requested_count = requested.len(),
            granted_count = granted.len(),
            user_id = %user_id,
            "scopes_validated"
        );

        Ok(granted)
    }

    /// Downscoping during refresh: succeeds iff `requested ⊆ original`
    pub fn validate_downscoping(original: &[String], requested: &[String]) -> bool {
        let original: HashSet<&str> = original.iter().map(String::as_str).collect();
        requested.iter().all(|scope| original.contains(scope.as_str()))
    }

    /// The full advertised scope list: every permission in the catalog
    pub async fn get_all_available_scopes(&self) -> Result<Vec<String>, OAuthError> {
        let permissions = self
            .perm_repo
            .list_all()
            .await
            .map_err(|e| OAuthError::ServerError(e.to_string()))?;

        Ok(permissions.iter().map(|p| p.canonical()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_scope_string() {
        assert_eq!(
            ScopeService::parse_scope_string("activity:create  activity:read"),
            scopes(&["activity:create", "activity:read"])
        );
        assert_eq!(
            ScopeService::parse_scope_string("a:b a:b"),
            scopes(&["a:b"])
        );
        assert!(ScopeService::parse_scope_string("   ").is_empty());
    }

    #[test]
    fn test_downscoping_subset_succeeds() {
        let original = scopes(&["activity:create", "activity:read", "activity:update"]);
        assert!(ScopeService::validate_downscoping(
            &original,
            &scopes(&["activity:read"])
        ));
        assert!(ScopeService::validate_downscoping(&original, &original));
        assert!(ScopeService::validate_downscoping(&original, &[]));
    }

    #[test]
    fn test_downscoping_superset_fails() {
        let original = scopes(&["activity:read"]);
        assert!(!ScopeService::validate_downscoping(
            &original,
            &scopes(&["activity:read", "activity:delete"])
        ));
        assert!(!ScopeService::validate_downscoping(
            &[],
            &scopes(&["activity:read"])
        ));
    }
}
