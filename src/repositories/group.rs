use sqlx::PgPool;
use uuid::Uuid;

use crate::error::RbacError;
use crate::models::{Group, GroupMembership, Permission};
use crate::repositories::is_unique_violation;

/// Repository for groups, group membership and group permission grants
#[derive(Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a group; name unique per organization
    pub async fn create(
        &self,
        org_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Group, RbacError> {
        tracing::debug!(operation = "create_group", "repository call");

        sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (id, organization_id, name, description, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, organization_id, name, description, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RbacError::DuplicateGroupName
            } else {
                RbacError::InternalError(e.into())
            }
        })
    }

    pub async fn find_by_id(&self, group_id: Uuid) -> Result<Option<Group>, RbacError> {
        tracing::debug!(operation = "get_group_by_id", "repository call");

        sqlx::query_as::<_, Group>(
            r#"
            SELECT id, organization_id, name, description, created_at
            FROM groups
            WHERE id = $1
            "#,
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))
    }

    pub async fn list_for_organization(&self, org_id: Uuid) -> Result<Vec<Group>, RbacError> {
        tracing::debug!(operation = "list_groups", "repository call");

        sqlx::query_as::<_, Group>(
            r#"
            SELECT id, organization_id, name, description, created_at
            FROM groups
            WHERE organization_id = $1
            ORDER BY name
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))
    }

    pub async fn delete(&self, group_id: Uuid) -> Result<bool, RbacError> {
        tracing::debug!(operation = "delete_group", "repository call");

        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RbacError::InternalError(e.into()))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn add_member(&self, user_id: Uuid, group_id: Uuid) -> Result<(), RbacError> {
        tracing::debug!(operation = "add_user_to_group", "repository call");

        sqlx::query(
            r#"
            INSERT INTO group_members (user_id, group_id, added_at)
            VALUES ($1, $2, NOW())
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RbacError::GroupMemberAlreadyExists
            } else {
                RbacError::InternalError(e.into())
            }
        })?;

        Ok(())
    }

    pub async fn remove_member(&self, user_id: Uuid, group_id: Uuid) -> Result<(), RbacError> {
        tracing::debug!(operation = "remove_user_from_group", "repository call");

        let result = sqlx::query(
            r#"
            DELETE FROM group_members
            WHERE user_id = $1 AND group_id = $2
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(RbacError::NotGroupMember);
        }
        Ok(())
    }

    pub async fn list_members(&self, group_id: Uuid) -> Result<Vec<GroupMembership>, RbacError> {
        tracing::debug!(operation = "get_group_members", "repository call");

        sqlx::query_as::<_, GroupMembership>(
            r#"
            SELECT user_id, group_id, added_at
            FROM group_members
            WHERE group_id = $1
            ORDER BY added_at
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))
    }

    pub async fn grant_permission(
        &self,
        group_id: Uuid,
        permission_id: Uuid,
        granted_by: Option<Uuid>,
    ) -> Result<(), RbacError> {
        tracing::debug!(operation = "grant_permission_to_group", "repository call");

        sqlx::query(
            r#"
            INSERT INTO group_permissions (group_id, permission_id, granted_at, granted_by)
            VALUES ($1, $2, NOW(), $3)
            "#,
        )
        .bind(group_id)
        .bind(permission_id)
        .bind(granted_by)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RbacError::GroupPermissionAlreadyGranted
            } else {
                RbacError::InternalError(e.into())
            }
        })?;

        Ok(())
    }

    pub async fn revoke_permission(
        &self,
        group_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), RbacError> {
        tracing::debug!(operation = "revoke_permission_from_group", "repository call");

        let result = sqlx::query(
            r#"
            DELETE FROM group_permissions
            WHERE group_id = $1 AND permission_id = $2
            "#,
        )
        .bind(group_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(RbacError::GroupPermissionNotGranted);
        }
        Ok(())
    }

    pub async fn list_permissions(&self, group_id: Uuid) -> Result<Vec<Permission>, RbacError> {
        tracing::debug!(operation = "list_group_permissions", "repository call");

        sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.id, p.resource, p.action, p.description, p.created_at
            FROM permissions p
            JOIN group_permissions gp ON gp.permission_id = p.id
            WHERE gp.group_id = $1
            ORDER BY p.resource, p.action
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))
    }
}
