//! Group and permission management endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::auth::MessageResponse;
use crate::dto::rbac::{
    AddGroupMemberRequest, CreateGroupRequest, CreatePermissionRequest, GrantPermissionRequest,
};
use crate::error::RbacError;
use crate::handlers::group_service;
use crate::middleware::AuthUser;

pub async fn create_group_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, RbacError> {
    let group = group_service(&state)
        .create_group(
            auth_user.user_id,
            org_id,
            &payload.name,
            payload.description.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_groups_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, RbacError> {
    let groups = group_service(&state)
        .list_groups(auth_user.user_id, org_id)
        .await?;
    Ok(Json(groups))
}

pub async fn delete_group_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, RbacError> {
    group_service(&state)
        .delete_group(auth_user.user_id, group_id)
        .await?;
    Ok(Json(MessageResponse::new("Group deleted")))
}

pub async fn list_group_members_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, RbacError> {
    let members = group_service(&state)
        .list_group_members(auth_user.user_id, group_id)
        .await?;
    Ok(Json(members))
}

pub async fn add_group_member_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<AddGroupMemberRequest>,
) -> Result<impl IntoResponse, RbacError> {
    group_service(&state)
        .add_user_to_group(auth_user.user_id, group_id, payload.user_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User added to group")),
    ))
}

pub async fn remove_group_member_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, RbacError> {
    group_service(&state)
        .remove_user_from_group(auth_user.user_id, group_id, user_id)
        .await?;
    Ok(Json(MessageResponse::new("User removed from group")))
}

pub async fn grant_group_permission_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<GrantPermissionRequest>,
) -> Result<impl IntoResponse, RbacError> {
    group_service(&state)
        .grant_permission(auth_user.user_id, group_id, payload.permission_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Permission granted to group")),
    ))
}

pub async fn revoke_group_permission_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((group_id, permission_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, RbacError> {
    group_service(&state)
        .revoke_permission(auth_user.user_id, group_id, permission_id)
        .await?;
    Ok(Json(MessageResponse::new("Permission revoked from group")))
}

pub async fn list_group_permissions_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, RbacError> {
    let permissions = group_service(&state)
        .list_group_permissions(auth_user.user_id, group_id)
        .await?;
    Ok(Json(permissions))
}

pub async fn create_permission_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<CreatePermissionRequest>,
) -> Result<impl IntoResponse, RbacError> {
    let permission = group_service(&state)
        .create_permission(
            auth_user.user_id,
            payload.organization_id,
            &payload.resource,
            &payload.action,
            payload.description.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

pub async fn list_permissions_handler(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> Result<impl IntoResponse, RbacError> {
    let permissions = group_service(&state).list_permissions().await?;
    Ok(Json(permissions))
}
