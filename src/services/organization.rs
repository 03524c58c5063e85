//! Organization management: membership, roles, and the invalidation hooks
//! the PDP depends on.
//!
//! Every organization keeps at least one owner. Membership and role
//! mutations invalidate the affected user's cached authorization state;
//! invalidation is best-effort because every cache entry carries a TTL.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::RbacError;
use crate::models::{Organization, OrganizationMembership, OrganizationRole, UserOrganization};
use crate::repositories::OrganizationRepository;
use crate::services::authorization::AuthorizationService;

#[derive(Clone)]
pub struct OrganizationService {
    repo: OrganizationRepository,
    authz: AuthorizationService,
}

impl OrganizationService {
    pub fn new(pool: PgPool, authz: AuthorizationService) -> Self {
        Self {
            repo: OrganizationRepository::new(pool),
            authz,
        }
    }

    /// Members with owner or admin role manage membership
    async fn ensure_can_manage(&self, actor: Uuid, org_id: Uuid) -> Result<(), RbacError> {
        match self.repo.get_member_role(actor, org_id).await? {
            None => Err(RbacError::UserNotOrganizationMember),
            Some(role) if role.can_manage_members() => Ok(()),
            Some(_) => Err(RbacError::InsufficientOrganizationPermission),
        }
    }

    pub async fn create_organization(
        &self,
        creator: Uuid,
        name: &str,
        slug: &str,
    ) -> Result<Organization, RbacError> {
        let org = self.repo.create(name, slug, creator).await?;
        tracing::info!(org_id = %org.id, creator = %creator, "organization_created");
        Ok(org)
    }

    pub async fn get_organization(
        &self,
        actor: Uuid,
        org_id: Uuid,
    ) -> Result<Organization, RbacError> {
        if !self.repo.is_member(actor, org_id).await? {
            return Err(RbacError::UserNotOrganizationMember);
        }
        self.repo
            .find_by_id(org_id)
            .await?
            .ok_or(RbacError::OrganizationNotFound)
    }

    pub async fn list_user_organizations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserOrganization>, RbacError> {
        self.repo.list_for_user(user_id).await
    }

    pub async fn list_members(
        &self,
        actor: Uuid,
        org_id: Uuid,
    ) -> Result<Vec<OrganizationMembership>, RbacError> {
        if !self.repo.is_member(actor, org_id).await? {
            return Err(RbacError::UserNotOrganizationMember);
        }
        self.repo.list_members(org_id).await
    }

    /// Add a member; idempotent for the same `(user, org)`
    pub async fn add_member(
        &self,
        actor: Uuid,
        org_id: Uuid,
        user_id: Uuid,
        role: OrganizationRole,
    ) -> Result<(), RbacError> {
        self.ensure_can_manage(actor, org_id).await?;

        if self.repo.find_by_id(org_id).await?.is_none() {
            return Err(RbacError::OrganizationNotFound);
        }

        let added = self.repo.add_member(user_id, org_id, role).await?;
        if added {
            tracing::info!(org_id = %org_id, user_id = %user_id, role = %role, "member_added");
            // Membership changes flip not-a-member decisions.
            self.authz.invalidate_user_cache(user_id, org_id).await;
        }
        Ok(())
    }

    /// Remove a member; refuses to remove the last owner
    pub async fn remove_member(
        &self,
        actor: Uuid,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), RbacError> {
        self.ensure_can_manage(actor, org_id).await?;

        let Some(target_role) = self.repo.get_member_role(user_id, org_id).await? else {
            return Err(RbacError::UserNotOrganizationMember);
        };

        if target_role == OrganizationRole::Owner && self.repo.count_owners(org_id).await? <= 1 {
            return Err(RbacError::LastOwnerRemoval);
        }

        self.repo.remove_member(user_id, org_id).await?;
        tracing::info!(org_id = %org_id, user_id = %user_id, "member_removed");

        self.authz.invalidate_user_cache(user_id, org_id).await;
        Ok(())
    }

    /// Change a member's role; demoting the last owner is refused
    pub async fn update_member_role(
        &self,
        actor: Uuid,
        org_id: Uuid,
        user_id: Uuid,
        role: OrganizationRole,
    ) -> Result<(), RbacError> {
        self.ensure_can_manage(actor, org_id).await?;

        let Some(current) = self.repo.get_member_role(user_id, org_id).await? else {
            return Err(RbacError::UserNotOrganizationMember);
        };

        if current == OrganizationRole::Owner
            && role != OrganizationRole::Owner
            && self.repo.count_owners(org_id).await? <= 1
        {
            return Err(RbacError::LastOwnerRemoval);
        }

        self.repo.update_member_role(user_id, org_id, role).await?;
        tracing::info!(org_id = %org_id, user_id = %user_id, role = %role, "member_role_updated");

        self.authz.invalidate_user_cache(user_id, org_id).await;
        Ok(())
    }
}
