//! Organization management endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::auth::MessageResponse;
use crate::dto::rbac::{AddMemberRequest, CreateOrganizationRequest, UpdateRoleRequest};
use crate::error::RbacError;
use crate::handlers::organization_service;
use crate::middleware::AuthUser;

pub async fn create_organization_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, RbacError> {
    let org = organization_service(&state)
        .create_organization(auth_user.user_id, &payload.name, &payload.slug)
        .await?;
    Ok((StatusCode::CREATED, Json(org)))
}

pub async fn list_my_organizations_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<impl IntoResponse, RbacError> {
    let organizations = organization_service(&state)
        .list_user_organizations(auth_user.user_id)
        .await?;
    Ok(Json(organizations))
}

pub async fn get_organization_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, RbacError> {
    let org = organization_service(&state)
        .get_organization(auth_user.user_id, org_id)
        .await?;
    Ok(Json(org))
}

pub async fn list_members_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, RbacError> {
    let members = organization_service(&state)
        .list_members(auth_user.user_id, org_id)
        .await?;
    Ok(Json(members))
}

pub async fn add_member_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, RbacError> {
    organization_service(&state)
        .add_member(auth_user.user_id, org_id, payload.user_id, payload.role)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Member added")),
    ))
}

pub async fn remove_member_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((org_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, RbacError> {
    organization_service(&state)
        .remove_member(auth_user.user_id, org_id, user_id)
        .await?;
    Ok(Json(MessageResponse::new("Member removed")))
}

pub async fn update_member_role_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((org_id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, RbacError> {
    organization_service(&state)
        .update_member_role(auth_user.user_id, org_id, user_id, payload.role)
        .await?;
    Ok(Json(MessageResponse::new("Member role updated")))
}
