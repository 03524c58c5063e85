//! Policy Decision Point endpoints: the permission check peers call, the
//! permission listing, and the audit integrity surface.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::rbac::{AuditVerifyQuery, UserPermissionsQuery};
use crate::error::RbacError;
use crate::handlers::{authorization_service, organization_service};
use crate::middleware::AuthUser;
use crate::models::RequestContext;
use crate::services::authorization::AuthorizationRequest;

/// POST /authorize: the PDP check
pub async fn authorize_check_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<AuthorizationRequest>,
) -> Result<impl IntoResponse, RbacError> {
    let response = authorization_service(&state).authorize(&request, &ctx).await?;
    Ok(Json(response))
}

/// GET /users/{id}/permissions?org_id=…
///
/// Callers may read their own permissions; reading another user's requires
/// owner or admin role in the organization.
pub async fn user_permissions_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<UserPermissionsQuery>,
) -> Result<impl IntoResponse, RbacError> {
    if auth_user.user_id != user_id {
        let role = organization_service(&state)
            .list_user_organizations(auth_user.user_id)
            .await?
            .into_iter()
            .find(|org| org.id == query.org_id)
            .map(|org| org.role);

        match role {
            Some(role) if role.can_manage_members() => {}
            Some(_) => return Err(RbacError::InsufficientOrganizationPermission),
            None => return Err(RbacError::UserNotOrganizationMember),
        }
    }

    let response = authorization_service(&state)
        .get_user_permissions(user_id, query.org_id)
        .await?;
    Ok(Json(response))
}

/// GET /audit/verify: walk the hash chain over an id window
pub async fn audit_verify_handler(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Query(query): Query<AuditVerifyQuery>,
) -> Result<impl IntoResponse, RbacError> {
    let verification = state
        .audit
        .verify_chain(query.from_id, query.to_id)
        .await
        .map_err(RbacError::InternalError)?;

    Ok(Json(verification))
}

/// GET /audit/stats: pipeline counters for monitoring
pub async fn audit_stats_handler(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> impl IntoResponse {
    Json(state.audit.stats())
}
