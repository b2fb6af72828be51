use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::context::DynamicMap;

/// §3: an action a principal may attempt (`read`, `write`, `approve_shift`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// §3: a protected object type (`shift`, `diary_entry`, `workplace`, ...).
/// `resource_type` groups instances of the same kind (e.g. several `Resource`
/// rows named `shift-north`, `shift-south` can share `resource_type: "shift"`);
/// `parent_id` lets resource types nest into the DAG §3 describes (a ward
/// resource parented under a hospital resource, say), so a grant on the parent
/// can be interpreted as covering its children.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    pub parent_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// §3/§4.2: a `(resource, action)` pair a role can be bound to. `name` is the
/// stable handle used in scenarios and API bodies (`doc_read`); `resource_id`
/// and `action_id` are optional since a permission need not pin down one
/// concrete resource/action pair -- omitting either makes the permission
/// match broadly (any resource of the bound type, or any action) rather than
/// only the exact pair. `conditions` holds the §4.8 condition clauses
/// (`time_range`, `ip_range`, `mfa_required`, `user_status`, `resource_owner`,
/// `max_requests_per_hour`) evaluated during authorization; an empty map
/// means "always applies when bound".
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Permission {
    pub id: String,
    pub name: String,
    pub resource_id: Option<String>,
    pub action_id: Option<String>,
    pub conditions: DynamicMap,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateActionInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateResourceInput {
    pub name: String,
    pub resource_type: String,
    pub parent_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePermissionInput {
    pub name: String,
    pub resource_id: Option<String>,
    pub action_id: Option<String>,
    #[serde(default)]
    pub conditions: DynamicMap,
}
