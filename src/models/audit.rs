use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::context::DynamicMap;

/// §4.3: outcome recorded against an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
    Denied,
}

/// §4.3: emission priority. `SecurityEvent` bypasses the bounded async buffer
/// and writes synchronously so a crash can never silently drop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditPriority {
    Normal,
    SecurityEvent,
}

/// §4.3 Audit Log: an immutable record of who did what to whom. Never
/// updated or hard-deleted once written; `ArchiveOlderThan` moves rows out of
/// the hot table but does not mutate them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditEvent {
    pub id: String,
    pub actor_id: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status: AuditStatus,
    pub priority: AuditPriority,
    pub details: DynamicMap,
    pub ip_address: Option<String>,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EmitAuditEventInput {
    pub actor_id: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status: AuditStatus,
    #[serde(default)]
    pub priority: AuditPriority,
    #[serde(default)]
    pub details: DynamicMap,
    pub ip_address: Option<String>,
    pub request_id: Option<String>,
}

impl Default for AuditPriority {
    fn default() -> Self {
        AuditPriority::Normal
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema, Default)]
pub struct AuditQuery {
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status: Option<AuditStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
}

fn default_audit_limit() -> i64 {
    50
}
