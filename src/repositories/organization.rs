use sqlx::PgPool;
use uuid::Uuid;

use crate::error::RbacError;
use crate::models::{Organization, OrganizationMembership, OrganizationRole, UserOrganization};
use crate::repositories::is_unique_violation;

/// Repository for organizations and memberships
#[derive(Clone)]
pub struct OrganizationRepository {
    pool: PgPool,
}

impl OrganizationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an organization with its founding owner in one transaction.
    ///
    /// Every organization has at least one owner from birth; the last-owner
    /// guard keeps it that way.
    pub async fn create(
        &self,
        name: &str,
        slug: &str,
        owner_user_id: Uuid,
    ) -> Result<Organization, RbacError> {
        tracing::debug!(operation = "create_organization", "repository call");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RbacError::InternalError(e.into()))?;

        let org = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (id, name, slug, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, name, slug, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RbacError::InternalError(anyhow::anyhow!("Organization slug already exists"))
            } else {
                RbacError::InternalError(e.into())
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO organization_members (user_id, organization_id, role, joined_at)
            VALUES ($1, $2, 'owner', NOW())
            "#,
        )
        .bind(owner_user_id)
        .bind(org.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| RbacError::InternalError(e.into()))?;

        Ok(org)
    }

    pub async fn find_by_id(&self, org_id: Uuid) -> Result<Option<Organization>, RbacError> {
        tracing::debug!(operation = "get_organization_by_id", "repository call");

        sqlx::query_as::<_, Organization>(
            "SELECT id, name, slug, created_at FROM organizations WHERE id = $1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))
    }

    /// Organizations the user belongs to, with their role; drives login
    /// organization resolution
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<UserOrganization>, RbacError> {
        tracing::debug!(operation = "get_user_organizations", "repository call");

        sqlx::query_as::<_, UserOrganization>(
            r#"
            SELECT o.id, o.name, o.slug, m.role
            FROM organizations o
            JOIN organization_members m ON m.organization_id = o.id
            WHERE m.user_id = $1
            ORDER BY o.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))
    }

    pub async fn is_member(&self, user_id: Uuid, org_id: Uuid) -> Result<bool, RbacError> {
        tracing::debug!(operation = "is_org_member", "repository call");

        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM organization_members
            WHERE user_id = $1 AND organization_id = $2
            "#,
        )
        .bind(user_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))?;

        Ok(row.is_some())
    }

    pub async fn get_member_role(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<Option<OrganizationRole>, RbacError> {
        tracing::debug!(operation = "get_user_org_role", "repository call");

        let row: Option<(OrganizationRole,)> = sqlx::query_as(
            r#"
            SELECT role FROM organization_members
            WHERE user_id = $1 AND organization_id = $2
            "#,
        )
        .bind(user_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))?;

        Ok(row.map(|(role,)| role))
    }

    pub async fn list_members(
        &self,
        org_id: Uuid,
    ) -> Result<Vec<OrganizationMembership>, RbacError> {
        tracing::debug!(operation = "list_org_members", "repository call");

        sqlx::query_as::<_, OrganizationMembership>(
            r#"
            SELECT user_id, organization_id, role, joined_at
            FROM organization_members
            WHERE organization_id = $1
            ORDER BY joined_at
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))
    }

    /// Add a member. Idempotent: re-adding the same `(user, org)` leaves the
    /// existing row untouched and reports false.
    pub async fn add_member(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        role: OrganizationRole,
    ) -> Result<bool, RbacError> {
        tracing::debug!(operation = "add_organization_member", "repository call");

        let result = sqlx::query(
            r#"
            INSERT INTO organization_members (user_id, organization_id, role, joined_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, organization_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(org_id)
        .bind(role)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_member(&self, user_id: Uuid, org_id: Uuid) -> Result<bool, RbacError> {
        tracing::debug!(operation = "remove_organization_member", "repository call");

        let result = sqlx::query(
            r#"
            DELETE FROM organization_members
            WHERE user_id = $1 AND organization_id = $2
            "#,
        )
        .bind(user_id)
        .bind(org_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_member_role(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        role: OrganizationRole,
    ) -> Result<bool, RbacError> {
        tracing::debug!(operation = "update_member_role", "repository call");

        let result = sqlx::query(
            r#"
            UPDATE organization_members
            SET role = $3
            WHERE user_id = $1 AND organization_id = $2
            "#,
        )
        .bind(user_id)
        .bind(org_id)
        .bind(role)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Owner count backs the last-owner guard
    pub async fn count_owners(&self, org_id: Uuid) -> Result<i64, RbacError> {
        tracing::debug!(operation = "count_org_owners", "repository call");

        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM organization_members
            WHERE organization_id = $1 AND role = 'owner'
            "#,
        )
        .bind(org_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))?;

        Ok(count)
    }
}
