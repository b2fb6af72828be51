use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// §3: Principal kind -- user or group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Group,
}

/// §3: lifecycle states a user principal moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Pending,
    Active,
    Suspended,
    Blocked,
}

/// A principal row (`USR...`/`GRP...`). All entities in §3 carry `created_at`,
/// `updated_at`, optional `deleted_at` (soft delete) and a monotonic `version`
/// for optimistic concurrency; this is the canonical shape every repository
/// method in [`crate::repositories::identity`] reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Principal {
    pub id: String,
    pub kind: PrincipalKind,
    pub phone_number: Option<String>,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(skip_serializing)]
    pub aadhaar_number: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub mpin_hash: Option<String>,
    #[serde(skip_serializing)]
    pub mfa_secret: Option<String>,
    pub status: UserStatus,
    pub is_validated: bool,
    pub username: Option<String>,
    pub tokens: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

pub fn default_country_code() -> String {
    "+91".to_string()
}

impl Principal {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateUserInput {
    pub phone_number: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    pub password: String,
    pub username: Option<String>,
    pub aadhaar_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Default)]
pub struct UpdateUserInput {
    pub username: Option<String>,
    pub status: Option<UserStatus>,
    pub is_validated: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeleteReceipt {
    pub id: String,
    pub deleted_at: DateTime<Utc>,
    pub deleted_by: Option<String>,
}
