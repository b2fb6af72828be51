//! C7 Session Service: login/refresh/revoke state machine around the token
//! primitives in [`super::tokens`].

use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditSink;
use crate::cache::KernelCache;
use crate::credentials::{mfa, mpin, password};
use crate::error::AppError;
use crate::models::{AuditPriority, AuditStatus, EmitAuditEventInput, LoginInput, TokenPair, UserStatus};
use crate::repositories::{AuditRepository, IdentityRepository, PolicyRepository};

use super::tokens;

pub struct SessionService {
    identity: Arc<IdentityRepository>,
    policy: Arc<PolicyRepository>,
    audit_repo: Arc<AuditRepository>,
    audit: Arc<AuditSink>,
    cache: Arc<dyn KernelCache>,
    jwt_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionService {
    pub fn new(
        identity: Arc<IdentityRepository>,
        policy: Arc<PolicyRepository>,
        audit_repo: Arc<AuditRepository>,
        audit: Arc<AuditSink>,
        cache: Arc<dyn KernelCache>,
        jwt_secret: String,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            identity,
            policy,
            audit_repo,
            audit,
            cache,
            jwt_secret,
            access_ttl,
            refresh_ttl,
        }
    }

    async fn record(&self, actor_id: Option<String>, action: &str, status: AuditStatus, ip: Option<String>) {
        let event = EmitAuditEventInput {
            actor_id,
            action: action.to_string(),
            resource_type: Some("session".to_string()),
            resource_id: None,
            status,
            priority: AuditPriority::SecurityEvent,
            details: Default::default(),
            ip_address: ip,
            request_id: None,
        };
        if let Err(error) = self.audit.emit(&self.audit_repo, event).await {
            tracing::error!(%error, "failed to emit session audit event");
        }
    }

    pub async fn login(&self, input: LoginInput, ip: Option<String>) -> Result<TokenPair, AppError> {
        let principal = self
            .identity
            .get_by_phone(&input.country_code, &input.phone_number)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid credentials".to_string()))?;

        if principal.status == UserStatus::Blocked {
            self.record(Some(principal.id.clone()), "login", AuditStatus::Denied, ip).await;
            return Err(AppError::UserBlocked);
        }
        if principal.status == UserStatus::Suspended || principal.status == UserStatus::Pending {
            self.record(Some(principal.id.clone()), "login", AuditStatus::Denied, ip).await;
            return Err(AppError::UserInactive);
        }

        if !password::verify(&input.password, &principal.password_hash)? {
            self.record(Some(principal.id.clone()), "login", AuditStatus::Failure, ip).await;
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        }

        if let Some(mfa_secret) = principal.mfa_secret.as_deref() {
            let code = input
                .mfa_code
                .as_deref()
                .ok_or_else(|| AppError::Validation("mfa code required".to_string()))?;
            if !mfa::verify_code(&self.cache, &principal.id, mfa_secret, code).await? {
                self.record(Some(principal.id.clone()), "login", AuditStatus::Failure, ip).await;
                return Err(AppError::Unauthorized("invalid mfa code".to_string()));
            }
        }

        let roles: Vec<String> = self
            .policy
            .get_principal_roles(&principal.id)
            .await?
            .into_iter()
            .map(|r| r.role_id)
            .collect();

        let pair = self.issue_pair(&principal.id, &roles, &principal).await?;
        self.record(Some(principal.id.clone()), "login", AuditStatus::Success, ip).await;
        Ok(pair)
    }

    async fn resolve_permissions(&self, roles: &[String]) -> Result<Vec<String>, AppError> {
        let mut names = Vec::new();
        for role_id in roles {
            for permission in self.policy.get_role_permissions(role_id).await? {
                if !names.contains(&permission.name) {
                    names.push(permission.name);
                }
            }
        }
        Ok(names)
    }

    async fn issue_pair(
        &self,
        principal_id: &str,
        roles: &[String],
        principal: &crate::models::Principal,
    ) -> Result<TokenPair, AppError> {
        let permissions = self.resolve_permissions(roles).await?;
        let access_token = tokens::issue_access_token(
            principal,
            roles,
            &permissions,
            &self.jwt_secret,
            self.access_ttl.as_secs() as i64,
        )?;
        let refresh_token = tokens::issue_refresh_token(principal_id);

        self.cache
            .set(
                &tokens::refresh_cache_key(principal_id),
                &refresh_token,
                Some(self.refresh_ttl),
            )
            .await?;

        Ok(TokenPair::bearer(access_token, refresh_token, self.access_ttl.as_secs() as i64))
    }

    /// §4.7: the principal is derived from the presented refresh token itself
    /// (it carries its owner as a prefix), not from a bearer access token --
    /// refreshing has to keep working after the access token has expired.
    /// Rotation then checks the full token against the single fingerprint
    /// held in cache for that principal, and requires the M-PIN before
    /// issuing a new pair: a mismatch on either means the token was already
    /// rotated, never existed, or is being replayed by someone without the
    /// M-PIN, so the whole session is treated as compromised and the
    /// fingerprint is dropped.
    pub async fn refresh(&self, presented_refresh_token: &str, presented_mpin: &str) -> Result<TokenPair, AppError> {
        let principal_id = tokens::refresh_token_subject(presented_refresh_token)?;
        let key = tokens::refresh_cache_key(principal_id);
        let stored = self.cache.get(&key).await?;

        match stored {
            Some(stored) if stored == presented_refresh_token => {
                let principal = self.identity.require_by_id(principal_id).await?;
                let mpin_hash = principal
                    .mpin_hash
                    .as_deref()
                    .ok_or_else(|| AppError::Unauthorized("mpin not enrolled".to_string()))?;
                if !mpin::verify(presented_mpin, mpin_hash)? {
                    self.record(Some(principal_id.to_string()), "refresh", AuditStatus::Denied, None).await;
                    return Err(AppError::Unauthorized("invalid mpin".to_string()));
                }

                let roles: Vec<String> = self
                    .policy
                    .get_principal_roles(principal_id)
                    .await?
                    .into_iter()
                    .map(|r| r.role_id)
                    .collect();
                self.issue_pair(principal_id, &roles, &principal).await
            }
            Some(_) => {
                self.cache.delete(&key).await?;
                self.record(Some(principal_id.to_string()), "refresh", AuditStatus::Denied, None).await;
                Err(AppError::Unauthorized("refresh token reuse detected".to_string()))
            }
            None => Err(AppError::Unauthorized("no active session".to_string())),
        }
    }

    pub async fn logout(&self, principal_id: &str) -> Result<(), AppError> {
        self.cache.delete(&tokens::refresh_cache_key(principal_id)).await?;
        self.record(Some(principal_id.to_string()), "logout", AuditStatus::Success, None).await;
        Ok(())
    }

    pub fn validate_access_token(&self, token: &str) -> Result<crate::models::AccessClaims, AppError> {
        tokens::validate_access_token(token, &self.jwt_secret)
    }
}
