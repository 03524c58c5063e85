use sqlx::PgPool;
use uuid::Uuid;

use crate::error::RbacError;
use crate::models::{Permission, UserPermissionGrant};
use crate::repositories::is_unique_violation;

/// Repository for the permission catalog and user permission resolution.
///
/// `user_has_permission` and `get_user_permissions` are the database half of
/// the PDP: groups convey permissions, organization membership gates them.
#[derive(Clone)]
pub struct PermissionRepository {
    pool: PgPool,
}

impl PermissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        resource: &str,
        action: &str,
        description: Option<&str>,
    ) -> Result<Permission, RbacError> {
        tracing::debug!(operation = "create_permission", "repository call");

        sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (id, resource, action, description, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, resource, action, description, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(resource)
        .bind(action)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RbacError::DuplicatePermission
            } else {
                RbacError::InternalError(e.into())
            }
        })
    }

    pub async fn find_by_id(&self, permission_id: Uuid) -> Result<Option<Permission>, RbacError> {
        tracing::debug!(operation = "get_permission_by_id", "repository call");

        sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, resource, action, description, created_at
            FROM permissions
            WHERE id = $1
            "#,
        )
        .bind(permission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))
    }

    pub async fn list_all(&self) -> Result<Vec<Permission>, RbacError> {
        tracing::debug!(operation = "list_permissions", "repository call");

        sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, resource, action, description, created_at
            FROM permissions
            ORDER BY resource, action
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))
    }

    /// True iff the user holds `(resource, action)` in the organization via
    /// any group
    pub async fn user_has_permission(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool, RbacError> {
        tracing::debug!(operation = "user_has_permission", "repository call");

        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1
            FROM group_members gm
            JOIN groups g ON g.id = gm.group_id
            JOIN group_permissions gp ON gp.group_id = g.id
            JOIN permissions p ON p.id = gp.permission_id
            WHERE gm.user_id = $1
              AND g.organization_id = $2
              AND p.resource = $3
              AND p.action = $4
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(org_id)
        .bind(resource)
        .bind(action)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))?;

        Ok(row.is_some())
    }

    /// Every permission grant the user holds in the organization, one row per
    /// conveying group
    pub async fn get_user_permissions(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<Vec<UserPermissionGrant>, RbacError> {
        tracing::debug!(operation = "get_user_permissions", "repository call");

        sqlx::query_as::<_, UserPermissionGrant>(
            r#"
            SELECT p.resource, p.action, g.name AS via_group_name, g.id AS via_group_id,
                   gp.granted_at, p.description
            FROM group_members gm
            JOIN groups g ON g.id = gm.group_id
            JOIN group_permissions gp ON gp.group_id = g.id
            JOIN permissions p ON p.id = gp.permission_id
            WHERE gm.user_id = $1 AND g.organization_id = $2
            ORDER BY p.resource, p.action, g.name
            "#,
        )
        .bind(user_id)
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::InternalError(e.into()))
    }
}
