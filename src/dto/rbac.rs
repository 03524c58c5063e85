use serde::Deserialize;
use uuid::Uuid;

use crate::models::OrganizationRole;

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default = "default_member_role")]
    pub role: OrganizationRole,
}

fn default_member_role() -> OrganizationRole {
    OrganizationRole::Member
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: OrganizationRole,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddGroupMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GrantPermissionRequest {
    pub permission_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub organization_id: Uuid,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserPermissionsQuery {
    pub org_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AuditVerifyQuery {
    pub from_id: Option<i64>,
    pub to_id: Option<i64>,
}
