//! Group and permission management.
//!
//! Groups carry permission grants; users join groups only within
//! organizations they already belong to. Every mutation that can change an
//! authorization answer invalidates the affected users' cached state.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::RbacError;
use crate::models::{Group, GroupMembership, Permission};
use crate::repositories::{GroupRepository, OrganizationRepository, PermissionRepository};
use crate::services::authorization::AuthorizationService;

#[derive(Clone)]
pub struct GroupService {
    group_repo: GroupRepository,
    org_repo: OrganizationRepository,
    perm_repo: PermissionRepository,
    authz: AuthorizationService,
}

impl GroupService {
    pub fn new(pool: PgPool, authz: AuthorizationService) -> Self {
        Self {
            group_repo: GroupRepository::new(pool.clone()),
            org_repo: OrganizationRepository::new(pool.clone()),
            perm_repo: PermissionRepository::new(pool),
            authz,
        }
    }

    async fn ensure_can_manage(&self, actor: Uuid, org_id: Uuid) -> Result<(), RbacError> {
        match self.org_repo.get_member_role(actor, org_id).await? {
            None => Err(RbacError::UserNotOrganizationMember),
            Some(role) if role.can_manage_members() => Ok(()),
            Some(_) => Err(RbacError::InsufficientOrganizationPermission),
        }
    }

    async fn group_in_org(&self, group_id: Uuid) -> Result<Group, RbacError> {
        self.group_repo
            .find_by_id(group_id)
            .await?
            .ok_or(RbacError::GroupNotFound)
    }

    pub async fn create_group(
        &self,
        actor: Uuid,
        org_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Group, RbacError> {
        self.ensure_can_manage(actor, org_id).await?;

        if self.org_repo.find_by_id(org_id).await?.is_none() {
            return Err(RbacError::OrganizationNotFound);
        }

        let group = self.group_repo.create(org_id, name, description).await?;
        tracing::info!(group_id = %group.id, org_id = %org_id, "group_created");
        Ok(group)
    }

    pub async fn list_groups(&self, actor: Uuid, org_id: Uuid) -> Result<Vec<Group>, RbacError> {
        if !self.org_repo.is_member(actor, org_id).await? {
            return Err(RbacError::UserNotOrganizationMember);
        }
        self.group_repo.list_for_organization(org_id).await
    }

    /// Delete a group; every member's cached state is invalidated
    pub async fn delete_group(&self, actor: Uuid, group_id: Uuid) -> Result<(), RbacError> {
        let group = self.group_in_org(group_id).await?;
        self.ensure_can_manage(actor, group.organization_id).await?;

        // Capture membership before the rows cascade away.
        let members = self.group_repo.list_members(group_id).await?;

        if !self.group_repo.delete(group_id).await? {
            return Err(RbacError::GroupNotFound);
        }
        tracing::info!(group_id = %group_id, "group_deleted");

        for member in members {
            self.authz
                .invalidate_user_cache(member.user_id, group.organization_id)
                .await;
        }
        Ok(())
    }

    pub async fn list_group_members(
        &self,
        actor: Uuid,
        group_id: Uuid,
    ) -> Result<Vec<GroupMembership>, RbacError> {
        let group = self.group_in_org(group_id).await?;
        if !self.org_repo.is_member(actor, group.organization_id).await? {
            return Err(RbacError::UserNotOrganizationMember);
        }
        self.group_repo.list_members(group_id).await
    }

    /// Add a user to a group. The user must already be a member of the
    /// group's organization.
    pub async fn add_user_to_group(
        &self,
        actor: Uuid,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), RbacError> {
        let group = self.group_in_org(group_id).await?;
        self.ensure_can_manage(actor, group.organization_id).await?;

        if !self.org_repo.is_member(user_id, group.organization_id).await? {
            return Err(RbacError::UserNotOrganizationMember);
        }

        self.group_repo.add_member(user_id, group_id).await?;
        tracing::info!(group_id = %group_id, user_id = %user_id, "group_member_added");

        self.authz
            .invalidate_user_cache(user_id, group.organization_id)
            .await;
        Ok(())
    }

    pub async fn remove_user_from_group(
        &self,
        actor: Uuid,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), RbacError> {
        let group = self.group_in_org(group_id).await?;
        self.ensure_can_manage(actor, group.organization_id).await?;

        self.group_repo.remove_member(user_id, group_id).await?;
        tracing::info!(group_id = %group_id, user_id = %user_id, "group_member_removed");

        self.authz
            .invalidate_user_cache(user_id, group.organization_id)
            .await;
        Ok(())
    }

    /// Grant a permission to a group; all members' caches are invalidated
    pub async fn grant_permission(
        &self,
        actor: Uuid,
        group_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), RbacError> {
        let group = self.group_in_org(group_id).await?;
        self.ensure_can_manage(actor, group.organization_id).await?;

        if self.perm_repo.find_by_id(permission_id).await?.is_none() {
            return Err(RbacError::PermissionNotFound);
        }

        self.group_repo
            .grant_permission(group_id, permission_id, Some(actor))
            .await?;
        tracing::info!(group_id = %group_id, permission_id = %permission_id, "permission_granted");

        self.authz
            .invalidate_group_caches(group_id, group.organization_id)
            .await;
        Ok(())
    }

    pub async fn revoke_permission(
        &self,
        actor: Uuid,
        group_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), RbacError> {
        let group = self.group_in_org(group_id).await?;
        self.ensure_can_manage(actor, group.organization_id).await?;

        self.group_repo
            .revoke_permission(group_id, permission_id)
            .await?;
        tracing::info!(group_id = %group_id, permission_id = %permission_id, "permission_revoked");

        self.authz
            .invalidate_group_caches(group_id, group.organization_id)
            .await;
        Ok(())
    }

    pub async fn list_group_permissions(
        &self,
        actor: Uuid,
        group_id: Uuid,
    ) -> Result<Vec<Permission>, RbacError> {
        let group = self.group_in_org(group_id).await?;
        if !self.org_repo.is_member(actor, group.organization_id).await? {
            return Err(RbacError::UserNotOrganizationMember);
        }
        self.group_repo.list_permissions(group_id).await
    }

    /// Create a catalog permission; gated on managing some organization
    pub async fn create_permission(
        &self,
        actor: Uuid,
        org_id: Uuid,
        resource: &str,
        action: &str,
        description: Option<&str>,
    ) -> Result<Permission, RbacError> {
        self.ensure_can_manage(actor, org_id).await?;

        let permission = self.perm_repo.create(resource, action, description).await?;
        tracing::info!(
            permission_id = %permission.id,
            resource = %resource,
            action = %action,
            "permission_created"
        );
        Ok(permission)
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, RbacError> {
        self.perm_repo.list_all().await
    }
}
