use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::extractors::permissions::require_permission;
use crate::extractors::AuthenticatedPrincipal;
use crate::models::{
    Action, AssignPermissionsInput, AssignResourceActionInput, AssignRoleInput, CreateActionInput,
    CreatePermissionInput, CreateResourceInput, CreateRoleInput, Permission, Resource,
    ResourceGrant, Role, RoleBinding, SuccessResponse, UpdateRoleInput, UserRole,
};
use crate::{AppResult, AppState};

/// POST /v1/roles
#[utoipa::path(
    post,
    path = "/v1/roles",
    request_body = CreateRoleInput,
    responses((status = 200, description = "Role created", body = Role)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Json(input): Json<CreateRoleInput>,
) -> AppResult<Json<Role>> {
    require_permission(&state, &principal, "role", "*", "create", None).await?;
    let role = state.policy.create_role(input).await?;
    Ok(Json(role))
}

/// GET /v1/roles
#[utoipa::path(
    get,
    path = "/v1/roles",
    responses((status = 200, description = "All roles", body = Vec<Role>)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
) -> AppResult<Json<Vec<Role>>> {
    require_permission(&state, &principal, "role", "*", "list", None).await?;
    let roles = state.policy.list_roles().await?;
    Ok(Json(roles))
}

/// GET /v1/roles/{id}
#[utoipa::path(
    get,
    path = "/v1/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    responses((status = 200, description = "Role found", body = Role), (status = 404, description = "Not found")),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn get_role(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<Role>> {
    require_permission(&state, &principal, "role", &id, "read", None).await?;
    let role = state.policy.require_role(&id).await?;
    Ok(Json(role))
}

/// PATCH /v1/roles/{id}
#[utoipa::path(
    patch,
    path = "/v1/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    request_body = UpdateRoleInput,
    responses((status = 200, description = "Role updated", body = Role)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
    Json(input): Json<UpdateRoleInput>,
) -> AppResult<Json<Role>> {
    require_permission(&state, &principal, "role", &id, "update", None).await?;
    let role = state.policy.update_role(&id, input).await?;
    Ok(Json(role))
}

/// DELETE /v1/roles/{id}
#[utoipa::path(
    delete,
    path = "/v1/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role deleted", body = SuccessResponse),
        (status = 409, description = "Role is a system role or still bound to a principal")
    ),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<SuccessResponse>> {
    require_permission(&state, &principal, "role", &id, "delete", None).await?;
    state.policy.delete_role(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /v1/roles/{id}/permissions
#[utoipa::path(
    get,
    path = "/v1/roles/{id}/permissions",
    params(("id" = String, Path, description = "Role id")),
    responses((status = 200, description = "Permissions bound to this role", body = Vec<Permission>)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn get_role_permissions(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Permission>>> {
    require_permission(&state, &principal, "role", &id, "read", None).await?;
    let permissions = state.policy.get_role_permissions(&id).await?;
    Ok(Json(permissions))
}

/// POST /v1/roles/{id}/permissions -- §4.2 `AssignPermissionsToRole`: a
/// set-union batch bind, idempotent per permission id.
#[utoipa::path(
    post,
    path = "/v1/roles/{id}/permissions",
    params(("id" = String, Path, description = "Role id")),
    request_body = AssignPermissionsInput,
    responses((status = 200, description = "Permissions bound to role", body = Vec<RoleBinding>)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn bind_permission(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
    Json(req): Json<AssignPermissionsInput>,
) -> AppResult<Json<Vec<RoleBinding>>> {
    require_permission(&state, &principal, "role", &id, "update", None).await?;
    let bindings = state.policy.assign_permissions_to_role(&id, &req.permission_ids).await?;
    Ok(Json(bindings))
}

/// DELETE /v1/roles/{id}/permissions/{permission_id}
#[utoipa::path(
    delete,
    path = "/v1/roles/{id}/permissions/{permission_id}",
    params(
        ("id" = String, Path, description = "Role id"),
        ("permission_id" = String, Path, description = "Permission id")
    ),
    responses((status = 200, description = "Permission unbound", body = SuccessResponse)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn unbind_permission(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path((id, permission_id)): Path<(String, String)>,
) -> AppResult<Json<SuccessResponse>> {
    require_permission(&state, &principal, "role", &id, "update", None).await?;
    state.policy.revoke_permission_from_role(&id, &permission_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /v1/roles/{id}/resource-actions -- §4.2 `AssignResourceAction`: a
/// role-scoped grant of one action on one resource instance, mirrored to the
/// relationship engine as a `role`-subject tuple.
#[utoipa::path(
    post,
    path = "/v1/roles/{id}/resource-actions",
    params(("id" = String, Path, description = "Role id")),
    request_body = AssignResourceActionInput,
    responses((status = 200, description = "Resource action granted to role", body = ResourceGrant)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn assign_resource_action(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
    Json(input): Json<AssignResourceActionInput>,
) -> AppResult<Json<ResourceGrant>> {
    require_permission(&state, &principal, "role", &id, "update", None).await?;
    let grant = state
        .policy
        .assign_resource_action(&id, input, Some(principal.principal_id.clone()))
        .await?;
    Ok(Json(grant))
}

/// DELETE /v1/roles/{id}/resource-actions/{resource_type}/{resource_id}/{action}
#[utoipa::path(
    delete,
    path = "/v1/roles/{id}/resource-actions/{resource_type}/{resource_id}/{action}",
    params(
        ("id" = String, Path, description = "Role id"),
        ("resource_type" = String, Path, description = "Resource type"),
        ("resource_id" = String, Path, description = "Resource id"),
        ("action" = String, Path, description = "Action")
    ),
    responses((status = 200, description = "Resource action revoked from role", body = SuccessResponse)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn revoke_resource_action(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path((id, resource_type, resource_id, action)): Path<(String, String, String, String)>,
) -> AppResult<Json<SuccessResponse>> {
    require_permission(&state, &principal, "role", &id, "update", None).await?;
    state.policy.revoke_resource_action(&id, &resource_type, &resource_id, &action).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /v1/users/{id}/roles
#[utoipa::path(
    post,
    path = "/v1/users/{id}/roles",
    params(("id" = String, Path, description = "Principal id")),
    request_body = AssignRoleInput,
    responses((status = 200, description = "Role assigned to principal", body = UserRole)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn assign_role(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
    Json(input): Json<AssignRoleInput>,
) -> AppResult<Json<UserRole>> {
    require_permission(&state, &principal, "principal", &id, "assign_role", None).await?;
    let assignment = state
        .policy
        .assign_role_to_principal(&id, input, Some(principal.principal_id.clone()))
        .await?;
    Ok(Json(assignment))
}

/// DELETE /v1/users/{id}/roles/{role_id}
#[utoipa::path(
    delete,
    path = "/v1/users/{id}/roles/{role_id}",
    params(
        ("id" = String, Path, description = "Principal id"),
        ("role_id" = String, Path, description = "Role id")
    ),
    responses((status = 200, description = "Role revoked from principal", body = SuccessResponse)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn revoke_role(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path((id, role_id)): Path<(String, String)>,
) -> AppResult<Json<SuccessResponse>> {
    require_permission(&state, &principal, "principal", &id, "assign_role", None).await?;
    state.policy.revoke_role_from_principal(&id, &role_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /v1/users/{id}/roles
#[utoipa::path(
    get,
    path = "/v1/users/{id}/roles",
    params(("id" = String, Path, description = "Principal id")),
    responses((status = 200, description = "Active role assignments", body = Vec<UserRole>)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn get_principal_roles(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<UserRole>>> {
    require_permission(&state, &principal, "principal", &id, "read", None).await?;
    let roles = state.policy.get_principal_roles(&id).await?;
    Ok(Json(roles))
}

/// POST /v1/resources
#[utoipa::path(
    post,
    path = "/v1/resources",
    request_body = CreateResourceInput,
    responses((status = 200, description = "Resource type created", body = Resource)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn create_resource(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Json(input): Json<CreateResourceInput>,
) -> AppResult<Json<Resource>> {
    require_permission(&state, &principal, "resource", "*", "create", None).await?;
    let resource = state.policy.create_resource(input).await?;
    Ok(Json(resource))
}

/// POST /v1/actions
#[utoipa::path(
    post,
    path = "/v1/actions",
    request_body = CreateActionInput,
    responses((status = 200, description = "Action created", body = Action)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn create_action(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Json(input): Json<CreateActionInput>,
) -> AppResult<Json<Action>> {
    require_permission(&state, &principal, "action", "*", "create", None).await?;
    let action = state.policy.create_action(input).await?;
    Ok(Json(action))
}

/// POST /v1/permissions
#[utoipa::path(
    post,
    path = "/v1/permissions",
    request_body = CreatePermissionInput,
    responses((status = 200, description = "Permission created", body = Permission)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn create_permission(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Json(input): Json<CreatePermissionInput>,
) -> AppResult<Json<Permission>> {
    require_permission(&state, &principal, "permission", "*", "create", None).await?;
    let permission = state.policy.create_permission(input).await?;
    Ok(Json(permission))
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct GrantResourceRequest {
    pub principal_id: String,
    pub relation: String,
}

/// POST /v2/resources/{type}/{id}/grants -- direct ReBAC grant (§4.5),
/// independent of any role.
#[utoipa::path(
    post,
    path = "/v2/resources/{type}/{id}/grants",
    params(
        ("type" = String, Path, description = "Resource type"),
        ("id" = String, Path, description = "Resource id")
    ),
    request_body = GrantResourceRequest,
    responses((status = 200, description = "Relationship granted", body = SuccessResponse)),
    tag = "roles",
    security(("bearer_auth" = []))
)]
pub async fn grant_resource(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path((resource_type, resource_id)): Path<(String, String)>,
    Json(req): Json<GrantResourceRequest>,
) -> AppResult<Json<SuccessResponse>> {
    require_permission(&state, &principal, &resource_type, &resource_id, "grant", None).await?;
    state
        .authz
        .grant(&req.principal_id, &resource_type, &resource_id, &req.relation)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}
