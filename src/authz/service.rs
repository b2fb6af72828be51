//! C8 Authorization Service: the hybrid RBAC + ReBAC decision point. RBAC
//! (role -> permission -> conditions, role -> resource action) is evaluated
//! first since it is local and cheap; ReBAC (direct relationship-engine
//! grants) is the fallback for anything RBAC doesn't cover. §4.8 fail-closed
//! semantics: if the relationship engine is unreachable and no RBAC grant
//! already decided the question, the default is to deny.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::cache::KernelCache;
use crate::error::AppError;
use crate::models::{AuditPriority, AuditStatus, DynamicMap, EmitAuditEventInput, Permission, UserStatus};
use crate::rebac::RelationshipEngineClient;
use crate::repositories::{AuditRepository, PolicyRepository};
use crate::sync::{IntentOperation, IntentRepository};
use crate::{audit::AuditSink, AppResult};

use super::policy::{self, EvaluationContext};

const DECISION_CACHE_TTL: Duration = Duration::from_secs(300);
const ALLOWED_STATUSES: [UserStatus; 1] = [UserStatus::Active];

pub struct AuthorizationService {
    policy: Arc<PolicyRepository>,
    rebac: Arc<RelationshipEngineClient>,
    cache: Arc<dyn KernelCache>,
    audit_repo: Arc<AuditRepository>,
    audit: Arc<AuditSink>,
    intents: Arc<IntentRepository>,
    fail_closed: bool,
}

#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub principal_id: String,
    pub principal_status: UserStatus,
    pub mfa_verified: bool,
    pub ip_address: Option<String>,
    pub resource_type: String,
    pub resource_id: String,
    pub resource_owner_id: Option<String>,
    pub action: String,
    pub conditions: DynamicMap,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl CheckResult {
    fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

impl AuthorizationService {
    pub fn new(
        policy: Arc<PolicyRepository>,
        rebac: Arc<RelationshipEngineClient>,
        cache: Arc<dyn KernelCache>,
        audit_repo: Arc<AuditRepository>,
        audit: Arc<AuditSink>,
        intents: Arc<IntentRepository>,
        fail_closed: bool,
    ) -> Self {
        Self {
            policy,
            rebac,
            cache,
            audit_repo,
            audit,
            intents,
            fail_closed,
        }
    }

    fn decision_key(req: &CheckRequest) -> String {
        format!(
            "perm:{}:{}:{}:{}",
            req.principal_id, req.resource_type, req.resource_id, req.action
        )
    }

    fn composite_key(resource_type: &str, resource_id: &str, action: &str) -> String {
        format!("{resource_type}:{resource_id}:{action}")
    }

    pub async fn check(&self, req: &CheckRequest) -> AppResult<CheckResult> {
        if let Some(denial) = self.static_preconditions(req) {
            self.emit_denied(req, &denial).await;
            return Ok(CheckResult::deny(denial));
        }

        let key = Self::decision_key(req);
        if let Some(cached) = self.cache.get(&key).await? {
            let allowed = cached == "1";
            if !allowed {
                self.emit_denied(req, "cached denial").await;
            }
            return Ok(if allowed { CheckResult::allow() } else { CheckResult::deny("cached denial") });
        }

        let result = self.evaluate_uncached(req).await?;
        let _ = self
            .cache
            .set(&key, if result.allowed { "1" } else { "0" }, Some(DECISION_CACHE_TTL))
            .await;

        if !result.allowed {
            self.emit_denied(req, result.reason.as_deref().unwrap_or("denied")).await;
        }
        Ok(result)
    }

    pub async fn check_bulk(&self, reqs: &[CheckRequest]) -> AppResult<HashMap<String, CheckResult>> {
        let mut out = HashMap::with_capacity(reqs.len());
        for req in reqs {
            let key = Self::composite_key(&req.resource_type, &req.resource_id, &req.action);
            let result = self.check(req).await?;
            out.insert(key, result);
        }
        Ok(out)
    }

    /// §4.8 static preconditions, evaluated before any RBAC/ReBAC lookup: a
    /// deleted or non-active subject is denied outright, independent of
    /// anything it might otherwise have been granted.
    fn static_preconditions(&self, req: &CheckRequest) -> Option<String> {
        if !ALLOWED_STATUSES.contains(&req.principal_status) {
            return Some("subject_inactive".to_string());
        }
        None
    }

    async fn emit_denied(&self, req: &CheckRequest, reason: &str) {
        let mut details = DynamicMap::new();
        details.insert("reason", reason);

        let event = EmitAuditEventInput {
            actor_id: Some(req.principal_id.clone()),
            action: format!("check:{}", req.action),
            resource_type: Some(req.resource_type.clone()),
            resource_id: Some(req.resource_id.clone()),
            status: AuditStatus::Denied,
            priority: AuditPriority::SecurityEvent,
            details,
            ip_address: req.ip_address.clone(),
            request_id: None,
        };
        if let Err(error) = self.audit.emit(&self.audit_repo, event).await {
            tracing::error!(%error, "failed to record access_denied audit event");
        }
    }

    async fn evaluate_uncached(&self, req: &CheckRequest) -> AppResult<CheckResult> {
        if self.rbac_grants(req).await? {
            return self.apply_conditions(req).await;
        }

        match self
            .rebac
            .check_permission(&req.resource_type, &req.resource_id, &req.action, "user", &req.principal_id)
            .await
        {
            Ok(true) => self.apply_conditions(req).await,
            Ok(false) => Ok(CheckResult::deny("no grant")),
            Err(error) => {
                tracing::error!(%error, "relationship engine unreachable during authorization check");
                if self.fail_closed {
                    Ok(CheckResult::deny("engine_unavailable"))
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Runs §4.8 condition evaluation after every path that could otherwise
    /// allow the check -- RBAC and ReBAC alike -- so a ReBAC grant can't skip
    /// `time_range`/`mfa_required`/etc just because RBAC wasn't the one that
    /// found it.
    async fn apply_conditions(&self, req: &CheckRequest) -> AppResult<CheckResult> {
        if req.conditions.0.is_empty() {
            return Ok(CheckResult::allow());
        }

        let ctx = EvaluationContext {
            principal_id: req.principal_id.clone(),
            principal_status: req.principal_status,
            mfa_verified: req.mfa_verified,
            ip_address: req.ip_address.clone(),
            resource_owner_id: req.resource_owner_id.clone(),
        };

        if policy::evaluate(&req.conditions, &ctx, &self.cache).await? {
            Ok(CheckResult::allow())
        } else {
            Ok(CheckResult::deny("condition_failed"))
        }
    }

    async fn rbac_grants(&self, req: &CheckRequest) -> AppResult<bool> {
        let user_roles = self.policy.get_principal_roles(&req.principal_id).await?;

        for user_role in user_roles {
            if let Some(scope) = &user_role.scope_id {
                if scope != &req.resource_id {
                    continue;
                }
            }

            if self
                .policy
                .get_resource_grant(&user_role.role_id, &req.resource_type, &req.resource_id, &req.action)
                .await?
                .is_some()
            {
                return Ok(true);
            }

            let permissions = self.policy.get_role_permissions(&user_role.role_id).await?;
            for permission in permissions {
                let permission_ctx = EvaluationContext {
                    principal_id: req.principal_id.clone(),
                    principal_status: req.principal_status,
                    mfa_verified: req.mfa_verified,
                    ip_address: req.ip_address.clone(),
                    resource_owner_id: req.resource_owner_id.clone(),
                };

                if !self.permission_matches(&permission, &req.resource_type, &req.action).await? {
                    continue;
                }

                if policy::evaluate(&permission.conditions, &permission_ctx, &self.cache).await? {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    async fn permission_matches(&self, permission: &Permission, resource_type: &str, action: &str) -> AppResult<bool> {
        let resource_matches = match &permission.resource_id {
            Some(resource_id) => self
                .policy
                .get_resource(resource_id)
                .await?
                .map(|r| r.resource_type == resource_type)
                .unwrap_or(false),
            None => true,
        };

        let action_matches = match &permission.action_id {
            Some(action_id) => self
                .policy
                .get_action(action_id)
                .await?
                .map(|a| a.name == action)
                .unwrap_or(false),
            None => true,
        };

        Ok(resource_matches && action_matches)
    }

    pub async fn lookup_permissions(&self, principal_id: &str) -> AppResult<Vec<Permission>> {
        let mut permissions = Vec::new();
        for user_role in self.policy.get_principal_roles(principal_id).await? {
            permissions.extend(self.policy.get_role_permissions(&user_role.role_id).await?);
        }
        Ok(permissions)
    }

    /// Direct ReBAC grant (§4.5), independent of any role. Enqueues a sync
    /// intent rather than writing the relationship engine inline, so the
    /// write is durable the moment this call returns even if the engine is
    /// briefly unreachable (Invariant 2).
    pub async fn grant(
        &self,
        principal_id: &str,
        resource_type: &str,
        resource_id: &str,
        relation: &str,
    ) -> AppResult<()> {
        let payload = json!({
            "resource_type": resource_type,
            "resource_id": resource_id,
            "relation": relation,
            "subject_type": "user",
            "subject_id": principal_id,
        });
        self.intents.enqueue(IntentOperation::WriteRelationship, payload).await?;
        self.invalidate(principal_id, resource_type, resource_id).await;
        Ok(())
    }

    pub async fn revoke(&self, principal_id: &str, resource_type: &str, resource_id: &str, relation: &str) -> AppResult<()> {
        let payload = json!({
            "resource_type": resource_type,
            "resource_id": resource_id,
            "relation": relation,
            "subject_type": "user",
            "subject_id": principal_id,
        });
        self.intents.enqueue(IntentOperation::DeleteRelationship, payload).await?;
        self.invalidate(principal_id, resource_type, resource_id).await;
        Ok(())
    }

    async fn invalidate(&self, principal_id: &str, resource_type: &str, resource_id: &str) {
        let _ = self.cache.delete_pattern(&format!("perm:{principal_id}:*")).await;
        let _ = self
            .cache
            .delete_pattern(&format!("perm:*:{resource_type}:{resource_id}:*"))
            .await;
    }
}
