use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::authz::{CheckRequest, CheckResult};
use crate::extractors::AuthenticatedPrincipal;
use crate::models::{DynamicMap, UserStatus};
use crate::{AppResult, AppState};

fn status_from_str(status: &str) -> UserStatus {
    match status {
        "active" => UserStatus::Active,
        "suspended" => UserStatus::Suspended,
        "blocked" => UserStatus::Blocked,
        _ => UserStatus::Pending,
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EvaluateRequest {
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    #[serde(default)]
    pub resource_owner_id: Option<String>,
    #[serde(default)]
    pub mfa_verified: bool,
    #[serde(default)]
    pub conditions: DynamicMap,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EvaluateResponse {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl From<CheckResult> for EvaluateResponse {
    fn from(result: CheckResult) -> Self {
        Self { allowed: result.allowed, reason: result.reason }
    }
}

fn client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
}

/// POST /v2/permissions/evaluate -- the hybrid RBAC + ReBAC decision point (§4.8).
#[utoipa::path(
    post,
    path = "/v2/permissions/evaluate",
    request_body = EvaluateRequest,
    responses((status = 200, description = "Authorization decision", body = EvaluateResponse)),
    tag = "permissions",
    security(("bearer_auth" = []))
)]
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    headers: axum::http::HeaderMap,
    Json(req): Json<EvaluateRequest>,
) -> AppResult<Json<EvaluateResponse>> {
    let check = CheckRequest {
        principal_id: principal.principal_id.clone(),
        principal_status: status_from_str(&principal.status),
        mfa_verified: req.mfa_verified,
        ip_address: client_ip(&headers),
        resource_type: req.resource_type,
        resource_id: req.resource_id,
        resource_owner_id: req.resource_owner_id,
        action: req.action,
        conditions: req.conditions,
    };
    let result = state.authz.check(&check).await?;
    Ok(Json(result.into()))
}

/// POST /v2/permissions/evaluate/bulk -- keyed by `resource_type:resource_id:action`
/// so a caller can match each decision back to the request that produced it.
#[utoipa::path(
    post,
    path = "/v2/permissions/evaluate/bulk",
    request_body = Vec<EvaluateRequest>,
    responses((status = 200, description = "Authorization decisions keyed by composite key", body = HashMap<String, EvaluateResponse>)),
    tag = "permissions",
    security(("bearer_auth" = []))
)]
pub async fn evaluate_bulk(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    headers: axum::http::HeaderMap,
    Json(reqs): Json<Vec<EvaluateRequest>>,
) -> AppResult<Json<HashMap<String, EvaluateResponse>>> {
    let ip = client_ip(&headers);
    let status = status_from_str(&principal.status);

    let checks: Vec<CheckRequest> = reqs
        .into_iter()
        .map(|req| CheckRequest {
            principal_id: principal.principal_id.clone(),
            principal_status: status,
            mfa_verified: req.mfa_verified,
            ip_address: ip.clone(),
            resource_type: req.resource_type,
            resource_id: req.resource_id,
            resource_owner_id: req.resource_owner_id,
            action: req.action,
            conditions: req.conditions,
        })
        .collect();

    let decisions = state.authz.check_bulk(&checks).await?;
    let decisions: HashMap<String, EvaluateResponse> = decisions.into_iter().map(|(k, v)| (k, v.into())).collect();
    Ok(Json(decisions))
}
