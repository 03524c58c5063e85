//! RBAC Policy Decision Point.
//!
//! The single source of truth for permission questions. Organization
//! membership gates every check; groups convey permissions. Two cache tiers
//! sit in front of the database: L1 caches individual decisions, L2 caches
//! the user's full permission set. Cache failures degrade to the database
//! path and never surface as authorization errors. Every decision is handed
//! to the audit pipeline.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::RbacError;
use crate::metrics::{AuthzResult, Metrics};
use crate::models::{parse_permission, CacheSource, RequestContext};
use crate::repositories::{GroupRepository, OrganizationRepository, PermissionRepository};
use crate::services::audit::{AuditLogger, AuthorizationDecision};

/// Reason strings are part of the external contract; peers match on them
const REASON_NOT_MEMBER: &str = "Not a member of the organization";
const REASON_VIA_GROUP: &str = "User has permission via group membership";
const REASON_INVALID_FORMAT: &str = "Invalid permission format (expected resource:action)";
const REASON_L2_HAS: &str = "User has permission";
const REASON_L2_MISSING: &str = "Permission not found in user's permissions";

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationRequest {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub permission: String,
    pub resource_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResponse {
    pub authorized: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_groups: Option<Vec<String>>,
    pub cache_source: CacheSource,
}

/// L1 cache payload: a full prior decision
#[derive(Debug, Serialize, Deserialize)]
struct CachedDecision {
    authorized: bool,
    reason: String,
    matched_groups: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionDetail {
    pub permission: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub via_group: String,
    pub via_group_id: Uuid,
    pub granted_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPermissionsResponse {
    pub permissions: Vec<String>,
    pub details: Vec<PermissionDetail>,
}

#[derive(Clone)]
pub struct AuthorizationService {
    org_repo: OrganizationRepository,
    perm_repo: PermissionRepository,
    group_repo: GroupRepository,
    cache: CacheStore,
    audit: Arc<AuditLogger>,
    metrics: Metrics,
    cache_enabled: bool,
    l2_cache_enabled: bool,
    cache_ttl_seconds: u64,
}

impl AuthorizationService {
    pub fn new(
        pool: PgPool,
        cache: CacheStore,
        config: &Config,
        metrics: Metrics,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            org_repo: OrganizationRepository::new(pool.clone()),
            perm_repo: PermissionRepository::new(pool.clone()),
            group_repo: GroupRepository::new(pool),
            cache,
            audit,
            metrics,
            cache_enabled: config.authz_cache_enabled,
            l2_cache_enabled: config.authz_cache_enabled && config.authz_l2_cache_enabled,
            cache_ttl_seconds: config.authz_cache_ttl_seconds,
        }
    }

    fn l1_key(user_id: Uuid, org_id: Uuid, permission: &str) -> String {
        format!("auth:check:{}:{}:{}", user_id, org_id, permission)
    }

    fn l2_key(user_id: Uuid, org_id: Uuid) -> String {
        format!("auth:perms:{}:{}", user_id, org_id)
    }

    /// Answer a permission question.
    ///
    /// Lookup order: L2 (full permission set) → L1 (prior decision) →
    /// database. Decisions are identical whichever tier answers; only
    /// `cache_source` differs.
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
        ctx: &RequestContext,
    ) -> Result<AuthorizationResponse, RbacError> {
        let Some((resource, action)) = parse_permission(&request.permission) else {
            tracing::warn!(
                permission = %request.permission,
                user_id = %request.user_id,
                "authorization_invalid_permission_format"
            );
            let response = AuthorizationResponse {
                authorized: false,
                reason: REASON_INVALID_FORMAT.to_string(),
                matched_groups: None,
                cache_source: if self.cache_enabled {
                    CacheSource::CacheMiss
                } else {
                    CacheSource::CacheDisabled
                },
            };
            self.emit_audit(request, &response, ctx);
            return Ok(response);
        };
        let (resource, action) = (resource.to_string(), action.to_string());

        // L2: the user's whole permission set answers by membership.
        if self.l2_cache_enabled {
            let l2_key = Self::l2_key(request.user_id, request.organization_id);
            match self.cache.get(&l2_key).await {
                Ok(Some(raw)) => {
                    if let Ok(permissions) = serde_json::from_str::<Vec<String>>(&raw) {
                        let authorized = permissions.contains(&request.permission);
                        tracing::debug!(
                            cache_key = %l2_key,
                            user_id = %request.user_id,
                            permission = %request.permission,
                            authorized,
                            "authz_l2_cache_hit"
                        );
                        self.metrics
                            .track_authz_check(AuthzResult::L2CacheHit, &resource, &action);

                        let response = AuthorizationResponse {
                            authorized,
                            reason: if authorized {
                                REASON_L2_HAS.to_string()
                            } else {
                                REASON_L2_MISSING.to_string()
                            },
                            matched_groups: None,
                            cache_source: CacheSource::L2Hit,
                        };
                        self.emit_audit(request, &response, ctx);
                        return Ok(response);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, cache_key = %l2_key, "authz_l2_cache_error");
                }
            }
        }

        // L1: a prior decision for this exact permission.
        if self.cache_enabled {
            let l1_key = Self::l1_key(request.user_id, request.organization_id, &request.permission);
            match self.cache.get(&l1_key).await {
                Ok(Some(raw)) => {
                    if let Ok(cached) = serde_json::from_str::<CachedDecision>(&raw) {
                        tracing::debug!(
                            cache_key = %l1_key,
                            user_id = %request.user_id,
                            permission = %request.permission,
                            "authz_l1_cache_hit"
                        );
                        self.metrics
                            .track_authz_check(AuthzResult::L1CacheHit, &resource, &action);

                        let response = AuthorizationResponse {
                            authorized: cached.authorized,
                            reason: cached.reason,
                            matched_groups: cached.matched_groups,
                            cache_source: CacheSource::L1Hit,
                        };
                        self.emit_audit(request, &response, ctx);
                        return Ok(response);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, cache_key = %l1_key, "authz_cache_error");
                }
            }
        }

        // Both tiers missed (or caching is off): evaluate from the database.
        let cache_source = if self.cache_enabled {
            self.metrics
                .track_authz_check(AuthzResult::CacheMiss, &resource, &action);
            CacheSource::CacheMiss
        } else {
            self.metrics
                .track_authz_check(AuthzResult::CacheDisabled, &resource, &action);
            CacheSource::CacheDisabled
        };

        let started = Instant::now();
        let mut response = self
            .authorize_from_database(request, &resource, &action)
            .await?;
        response.cache_source = cache_source;
        self.metrics
            .observe_authz_duration(&resource, &action, started.elapsed().as_secs_f64());

        // L1 write on every decision; failures never fail the request.
        if self.cache_enabled {
            let l1_key = Self::l1_key(request.user_id, request.organization_id, &request.permission);
            let cached = CachedDecision {
                authorized: response.authorized,
                reason: response.reason.clone(),
                matched_groups: response.matched_groups.clone(),
            };
            match serde_json::to_string(&cached) {
                Ok(payload) => {
                    if let Err(e) = self
                        .cache
                        .set_ex(&l1_key, &payload, self.cache_ttl_seconds)
                        .await
                    {
                        tracing::warn!(error = %e, cache_key = %l1_key, "authz_l1_cache_write_error");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "authz_l1_cache_serialize_error");
                }
            }
        }

        // L2 population on authorized decisions, when absent. Best-effort.
        if self.l2_cache_enabled && response.authorized {
            if let Err(e) = self.populate_l2(request.user_id, request.organization_id).await {
                tracing::warn!(
                    error = %e,
                    user_id = %request.user_id,
                    "authz_l2_cache_populate_error"
                );
            }
        }

        self.emit_audit(request, &response, ctx);
        Ok(response)
    }

    /// Database evaluation: membership gate, then permission via groups
    async fn authorize_from_database(
        &self,
        request: &AuthorizationRequest,
        resource: &str,
        action: &str,
    ) -> Result<AuthorizationResponse, RbacError> {
        let is_member = self
            .org_repo
            .is_member(request.user_id, request.organization_id)
            .await?;

        if !is_member {
            tracing::info!(
                user_id = %request.user_id,
                organization_id = %request.organization_id,
                "authorization_denied_not_member"
            );
            self.metrics
                .track_authz_check(AuthzResult::DeniedNotMember, resource, action);

            return Ok(AuthorizationResponse {
                authorized: false,
                reason: REASON_NOT_MEMBER.to_string(),
                matched_groups: None,
                cache_source: CacheSource::CacheMiss,
            });
        }

        let has_permission = self
            .perm_repo
            .user_has_permission(request.user_id, request.organization_id, resource, action)
            .await?;

        if !has_permission {
            tracing::info!(
                user_id = %request.user_id,
                organization_id = %request.organization_id,
                permission = %request.permission,
                "authorization_denied_no_permission"
            );
            self.metrics
                .track_authz_check(AuthzResult::DeniedNoPermission, resource, action);

            return Ok(AuthorizationResponse {
                authorized: false,
                reason: format!("No permission '{}' granted", request.permission),
                matched_groups: None,
                cache_source: CacheSource::CacheMiss,
            });
        }

        // Which groups convey it, for transparency in the response and audit.
        let grants = self
            .perm_repo
            .get_user_permissions(request.user_id, request.organization_id)
            .await?;

        let matched_groups: Vec<String> = grants
            .iter()
            .filter(|grant| grant.canonical() == request.permission)
            .map(|grant| grant.via_group_name.clone())
            .collect();

        tracing::info!(
            user_id = %request.user_id,
            organization_id = %request.organization_id,
            permission = %request.permission,
            matched_groups = ?matched_groups,
            "authorization_granted"
        );
        self.metrics
            .track_authz_check(AuthzResult::Granted, resource, action);

        Ok(AuthorizationResponse {
            authorized: true,
            reason: REASON_VIA_GROUP.to_string(),
            matched_groups: Some(matched_groups),
            cache_source: CacheSource::CacheMiss,
        })
    }

    /// Fill L2 with the user's deduplicated permission set, when absent
    async fn populate_l2(&self, user_id: Uuid, org_id: Uuid) -> anyhow::Result<()> {
        let l2_key = Self::l2_key(user_id, org_id);
        if self.cache.exists(&l2_key).await? {
            return Ok(());
        }

        let all_permissions = self.get_user_permissions(user_id, org_id).await?;
        let payload = serde_json::to_string(&all_permissions.permissions)?;
        self.cache
            .set_ex(&l2_key, &payload, self.cache_ttl_seconds)
            .await?;

        tracing::info!(
            cache_key = %l2_key,
            user_id = %user_id,
            permission_count = all_permissions.permissions.len(),
            "authz_l2_cache_populated"
        );
        Ok(())
    }

    /// All permissions the user holds in the organization, deduplicated and
    /// sorted, with per-grant detail
    pub async fn get_user_permissions(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<UserPermissionsResponse, RbacError> {
        let is_member = self.org_repo.is_member(user_id, organization_id).await?;
        if !is_member {
            return Ok(UserPermissionsResponse {
                permissions: vec![],
                details: vec![],
            });
        }

        let grants = self
            .perm_repo
            .get_user_permissions(user_id, organization_id)
            .await?;

        let mut permissions = Vec::new();
        let mut details = Vec::with_capacity(grants.len());

        for grant in grants {
            let canonical = grant.canonical();
            if !permissions.contains(&canonical) {
                permissions.push(canonical.clone());
            }
            details.push(PermissionDetail {
                permission: canonical,
                resource: grant.resource,
                action: grant.action,
                description: grant.description,
                via_group: grant.via_group_name,
                via_group_id: grant.via_group_id,
                granted_at: grant.granted_at,
            });
        }

        permissions.sort();

        Ok(UserPermissionsResponse {
            permissions,
            details,
        })
    }

    /// Drop every cached decision and the permission set for one user in one
    /// organization. Called on group membership and role changes.
    /// Best-effort: the TTL bounds staleness if this fails.
    pub async fn invalidate_user_cache(&self, user_id: Uuid, org_id: Uuid) {
        if !self.cache_enabled {
            return;
        }

        let pattern = format!("auth:check:{}:{}:*", user_id, org_id);
        match self.cache.delete_pattern(&pattern).await {
            Ok(deleted) => {
                tracing::info!(
                    user_id = %user_id,
                    org_id = %org_id,
                    keys_deleted = deleted,
                    "cache_invalidated_user"
                );
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    user_id = %user_id,
                    org_id = %org_id,
                    "cache_invalidation_error"
                );
            }
        }

        if let Err(e) = self.cache.delete(&Self::l2_key(user_id, org_id)).await {
            tracing::error!(error = %e, user_id = %user_id, "cache_invalidation_l2_error");
        }
    }

    /// Invalidate every member of a group. Called on permission grant or
    /// revoke and on group deletion.
    pub async fn invalidate_group_caches(&self, group_id: Uuid, org_id: Uuid) {
        if !self.cache_enabled {
            return;
        }

        let members = match self.group_repo.list_members(group_id).await {
            Ok(members) => members,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    group_id = %group_id,
                    "cache_invalidation_group_error"
                );
                return;
            }
        };

        let member_count = members.len();
        for member in members {
            self.invalidate_user_cache(member.user_id, org_id).await;
        }

        tracing::info!(
            group_id = %group_id,
            org_id = %org_id,
            members_count = member_count,
            "cache_invalidated_group"
        );
    }

    fn emit_audit(
        &self,
        request: &AuthorizationRequest,
        response: &AuthorizationResponse,
        ctx: &RequestContext,
    ) {
        self.audit.log_authorization(
            AuthorizationDecision {
                user_id: request.user_id,
                organization_id: request.organization_id,
                permission: request.permission.clone(),
                resource_id: request.resource_id,
                authorized: response.authorized,
                reason: response.reason.clone(),
                matched_groups: response.matched_groups.clone(),
                cache_source: response.cache_source,
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                request_id: ctx.request_id,
                session_id: ctx.session_id.clone(),
            },
            &ctx.intent,
        );
    }
}
