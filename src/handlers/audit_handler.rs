use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::extractors::permissions::require_permission;
use crate::extractors::AuthenticatedPrincipal;
use crate::models::{AuditEvent, AuditQuery, AuditStatus, EmitAuditEventInput};
use crate::{AppResult, AppState};

/// POST /v2/audit/events -- manual emission, for callers outside the kernel's
/// own request path that still need an audit trail entry.
#[utoipa::path(
    post,
    path = "/v2/audit/events",
    request_body = EmitAuditEventInput,
    responses((status = 200, description = "Audit event recorded", body = AuditEvent)),
    tag = "audit",
    security(("bearer_auth" = []))
)]
pub async fn emit_event(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Json(mut input): Json<EmitAuditEventInput>,
) -> AppResult<Json<AuditEvent>> {
    require_permission(&state, &principal, "audit_event", "*", "create", None).await?;
    if input.actor_id.is_none() {
        input.actor_id = Some(principal.principal_id.clone());
    }
    let event = state.audit_repo.emit(input).await?;
    Ok(Json(event))
}

/// GET /v2/audit/events
#[utoipa::path(
    get,
    path = "/v2/audit/events",
    params(
        ("actor_id" = Option<String>, Query, description = "Filter by actor"),
        ("action" = Option<String>, Query, description = "Filter by action"),
        ("resource_type" = Option<String>, Query, description = "Filter by resource type"),
        ("resource_id" = Option<String>, Query, description = "Filter by resource id"),
        ("status" = Option<AuditStatus>, Query, description = "Filter by outcome"),
        ("offset" = Option<i64>, Query, description = "Pagination offset"),
        ("limit" = Option<i64>, Query, description = "Page size")
    ),
    responses((status = 200, description = "Matching audit events", body = Vec<AuditEvent>)),
    tag = "audit",
    security(("bearer_auth" = []))
)]
pub async fn query_events(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Query(filter): Query<AuditQuery>,
) -> AppResult<Json<Vec<AuditEvent>>> {
    require_permission(&state, &principal, "audit_event", "*", "read", None).await?;
    let events = state.audit_repo.query(filter).await?;
    Ok(Json(events))
}
