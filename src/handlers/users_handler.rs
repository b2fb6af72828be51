use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::credentials::{mfa, mpin, password};
use crate::extractors::permissions::require_permission;
use crate::extractors::AuthenticatedPrincipal;
use crate::models::{
    CreateUserInput, DeleteReceipt, PageQuery, Principal, SuccessResponse, UpdateUserInput,
};
use crate::{AppError, AppResult, AppState};

/// POST /v2/users -- self-registration. Principals start `pending` until
/// validated through whatever out-of-band flow the deployment wires up.
#[utoipa::path(
    post,
    path = "/v2/users",
    request_body = CreateUserInput,
    responses(
        (status = 200, description = "Principal created", body = Principal),
        (status = 409, description = "Phone number already registered")
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateUserInput>,
) -> AppResult<Json<Principal>> {
    let password_hash = password::hash(&input.password)?;
    let principal = state.identity.create(input, password_hash).await?;
    Ok(Json(principal))
}

/// GET /v2/users/me
#[utoipa::path(
    get,
    path = "/v2/users/me",
    responses((status = 200, description = "The authenticated principal", body = Principal)),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn get_self(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
) -> AppResult<Json<Principal>> {
    let user = state.identity.require_by_id(&principal.principal_id).await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    #[serde(default = "default_search_limit")]
    limit: i64,
}

fn default_search_limit() -> i64 {
    20
}

/// GET /v2/users/{id}
#[utoipa::path(
    get,
    path = "/v2/users/{id}",
    params(("id" = String, Path, description = "Principal id")),
    responses(
        (status = 200, description = "Principal found", body = Principal),
        (status = 404, description = "Not found")
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<Principal>> {
    require_permission(&state, &principal, "principal", &id, "read", None).await?;
    let user = state.identity.require_by_id(&id).await?;
    Ok(Json(user))
}

/// GET /v2/users
#[utoipa::path(
    get,
    path = "/v2/users",
    params(
        ("offset" = Option<i64>, Query, description = "Pagination offset"),
        ("limit" = Option<i64>, Query, description = "Page size")
    ),
    responses((status = 200, description = "Principals page", body = Vec<Principal>)),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Vec<Principal>>> {
    require_permission(&state, &principal, "principal", "*", "list", None).await?;
    let users = state.identity.list(page.offset, page.limit).await?;
    Ok(Json(users))
}

/// GET /v2/users/search
#[utoipa::path(
    get,
    path = "/v2/users/search",
    params(("q" = String, Query, description = "Search term"), ("limit" = Option<i64>, Query, description = "Max results")),
    responses((status = 200, description = "Matching principals", body = Vec<Principal>)),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn search_users(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<Principal>>> {
    require_permission(&state, &principal, "principal", "*", "list", None).await?;
    if query.q.trim().is_empty() {
        return Err(AppError::Validation("q must not be empty".to_string()));
    }
    let users = state.identity.search(&query.q, query.limit).await?;
    Ok(Json(users))
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    #[serde(flatten)]
    input: UpdateUserInput,
    expected_version: i64,
}

/// PATCH /v2/users/{id}
#[utoipa::path(
    patch,
    path = "/v2/users/{id}",
    params(("id" = String, Path, description = "Principal id")),
    request_body = UpdateUserInput,
    responses(
        (status = 200, description = "Principal updated", body = Principal),
        (status = 409, description = "Version conflict")
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<Principal>> {
    require_permission(&state, &principal, "principal", &id, "update", None).await?;
    let updated = state.identity.update(&id, body.input, body.expected_version).await?;
    Ok(Json(updated))
}

/// DELETE /v2/users/{id} -- soft delete, cascading to profile/contact/address.
#[utoipa::path(
    delete,
    path = "/v2/users/{id}",
    params(("id" = String, Path, description = "Principal id")),
    responses((status = 200, description = "Principal soft-deleted", body = DeleteReceipt)),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<DeleteReceipt>> {
    require_permission(&state, &principal, "principal", &id, "delete", None).await?;
    let receipt = state.identity.soft_delete(&id, Some(principal.principal_id.clone())).await?;
    Ok(Json(receipt))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

/// PUT /v2/users/me/password
#[utoipa::path(
    put,
    path = "/v2/users/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = SuccessResponse),
        (status = 401, description = "Current password incorrect")
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let user = state.identity.require_by_id(&principal.principal_id).await?;
    if !password::verify(&req.current_password, &user.password_hash)? {
        return Err(AppError::Unauthorized("current password incorrect".to_string()));
    }
    let new_hash = password::hash(&req.new_password)?;
    state.identity.set_password_hash(&principal.principal_id, &new_hash).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Deserialize)]
pub struct SetMpinRequest {
    mpin: String,
}

/// PUT /v2/users/me/mpin
#[utoipa::path(
    put,
    path = "/v2/users/me/mpin",
    request_body = SetMpinRequest,
    responses((status = 200, description = "M-PIN set", body = SuccessResponse)),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn set_mpin(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Json(req): Json<SetMpinRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let hashed = mpin::hash(&req.mpin)?;
    state.identity.set_mpin_hash(&principal.principal_id, Some(&hashed)).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct EnrollMfaResponse {
    secret: String,
}

/// POST /v2/users/me/mfa/enroll -- issues a new TOTP secret; the caller is
/// expected to persist it in an authenticator app before the next login.
#[utoipa::path(
    post,
    path = "/v2/users/me/mfa/enroll",
    responses((status = 200, description = "New TOTP secret", body = EnrollMfaResponse)),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn enroll_mfa(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
) -> AppResult<Json<EnrollMfaResponse>> {
    let secret = mfa::generate_secret();
    state.identity.set_mfa_secret(&principal.principal_id, Some(&secret)).await?;
    Ok(Json(EnrollMfaResponse { secret }))
}

/// DELETE /v2/users/me/mfa -- disables MFA for the authenticated principal.
#[utoipa::path(
    delete,
    path = "/v2/users/me/mfa",
    responses((status = 200, description = "MFA disabled", body = SuccessResponse)),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn disable_mfa(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
) -> AppResult<Json<SuccessResponse>> {
    state.identity.set_mfa_secret(&principal.principal_id, None).await?;
    Ok(Json(SuccessResponse { success: true }))
}
