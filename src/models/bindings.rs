use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// §4.2: links a role to a permission it grants.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RoleBinding {
    pub id: String,
    pub role_id: String,
    pub permission_id: String,
    pub created_at: DateTime<Utc>,
}

/// §3/§4.2: assigns a role to a principal, optionally scoped to a single
/// resource instance (`scope_id`, e.g. a specific `workplace` row) rather than
/// the whole resource type. `None` means the role applies across all
/// instances of resources it governs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserRole {
    pub id: String,
    pub principal_id: String,
    pub role_id: String,
    pub scope_id: Option<String>,
    pub granted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserRole {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

/// §3: a role-scoped grant of one action on one resource instance --
/// `(role_id, resource_type, resource_id, action)`, unique on that tuple.
/// Every principal holding `role_id` inherits the grant; this is how C2
/// expresses "this role may `approve` this specific `workplace`" without a
/// direct per-principal relationship. Resource-scoped tuples the sync
/// controller emits to the relationship engine always trace back to either
/// this table or [`RoleBinding`] (Invariant 2).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ResourceGrant {
    pub id: String,
    pub role_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    pub granted_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// §4.2 `AssignPermissionsToRole` request body -- a set, not a single id;
/// binding an already-bound permission again is a no-op (set union).
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignPermissionsInput {
    pub permission_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignResourceActionInput {
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignRoleInput {
    pub role_id: String,
    pub scope_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

