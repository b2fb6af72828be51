use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// §3/§4.2 Policy Store: a named, describable collection of permissions that
/// principals are bound to. Roles are never hard-deleted once bound to any
/// principal (§4.2 invariant); `is_system` marks seed roles the kernel itself
/// depends on (e.g. `ADMIN`) that cannot be deleted at all.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Role {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRoleInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Default)]
pub struct UpdateRoleInput {
    pub description: Option<String>,
}
