//! C2 Policy Store: roles, actions, resources, permissions, and the bindings
//! between them (role -> permission, principal -> role, role -> resource
//! action). Every mutation that changes what a principal is allowed to do
//! invalidates that principal's decision-cache entries so a revoke is visible
//! to the next `Check` rather than waiting out the TTL.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;

use crate::cache::KernelCache;
use crate::error::AppError;
use crate::ids;
use crate::models::{
    Action, AssignRoleInput, CreateActionInput, CreatePermissionInput, CreateResourceInput,
    CreateRoleInput, Permission, Resource, ResourceGrant, Role, RoleBinding, UpdateRoleInput,
    UserRole,
};
use crate::sync::{IntentOperation, IntentRepository};

#[derive(Clone)]
pub struct PolicyRepository {
    db: PgPool,
    cache: Arc<dyn KernelCache>,
    intents: Arc<IntentRepository>,
}

impl PolicyRepository {
    pub fn new(db: PgPool, cache: Arc<dyn KernelCache>, intents: Arc<IntentRepository>) -> Self {
        Self { db, cache, intents }
    }

    pub async fn create_role(&self, input: CreateRoleInput) -> Result<Role, AppError> {
        if self.get_role_by_name(&input.name).await?.is_some() {
            return Err(AppError::AlreadyExists(format!("role {} already exists", input.name)));
        }

        let id = ids::generate_unique("ROLE", |candidate| {
            let db = self.db.clone();
            async move {
                let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM roles WHERE id = $1")
                    .bind(&candidate)
                    .fetch_optional(&db)
                    .await?;
                Ok(row.is_some())
            }
        })
        .await?;

        let now = Utc::now();
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (id, name, description, is_system, created_at, updated_at, version)
            VALUES ($1, $2, $3, false, $4, $4, 1)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(now)
        .fetch_one(&self.db)
        .await?;
        Ok(role)
    }

    pub async fn get_role(&self, id: &str) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(role)
    }

    pub async fn require_role(&self, id: &str) -> Result<Role, AppError> {
        self.get_role(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role {id} not found")))
    }

    pub async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1 AND deleted_at IS NULL")
            .bind(name)
            .fetch_optional(&self.db)
            .await?;
        Ok(role)
    }

    pub async fn update_role(&self, id: &str, input: UpdateRoleInput) -> Result<Role, AppError> {
        let current = self.require_role(id).await?;
        let description = input.description.or(current.description.clone());
        let role = sqlx::query_as::<_, Role>(
            "UPDATE roles SET description = $1, updated_at = $2, version = version + 1 WHERE id = $3 RETURNING *",
        )
        .bind(description)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        self.invalidate_role_principals(id).await;
        Ok(role)
    }

    /// §4.2 invariant: a role bound to any principal, or marked `is_system`,
    /// can never be deleted -- only new bindings are blocked going forward.
    pub async fn delete_role(&self, id: &str) -> Result<(), AppError> {
        let role = self.require_role(id).await?;
        if role.is_system {
            return Err(AppError::BusinessRule("system roles cannot be deleted".to_string()));
        }

        let (bound_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM user_roles WHERE role_id = $1")
                .bind(id)
                .fetch_one(&self.db)
                .await?;
        if bound_count > 0 {
            return Err(AppError::ConstraintViolation(
                "role is bound to at least one principal".to_string(),
            ));
        }

        sqlx::query("UPDATE roles SET deleted_at = $1, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, AppError> {
        let rows = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE deleted_at IS NULL ORDER BY name")
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    pub async fn create_action(&self, input: CreateActionInput) -> Result<Action, AppError> {
        let id = ids::generate("ACT");
        let action = sqlx::query_as::<_, Action>(
            "INSERT INTO actions (id, name, description, created_at) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;
        Ok(action)
    }

    pub async fn create_resource(&self, input: CreateResourceInput) -> Result<Resource, AppError> {
        let id = ids::generate("RES");
        let resource = sqlx::query_as::<_, Resource>(
            r#"
            INSERT INTO resources (id, name, resource_type, parent_id, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.resource_type)
        .bind(&input.parent_id)
        .bind(&input.description)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;
        Ok(resource)
    }

    pub async fn get_resource(&self, id: &str) -> Result<Option<Resource>, AppError> {
        let resource = sqlx::query_as::<_, Resource>("SELECT * FROM resources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(resource)
    }

    pub async fn get_action(&self, id: &str) -> Result<Option<Action>, AppError> {
        let action = sqlx::query_as::<_, Action>("SELECT * FROM actions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(action)
    }

    pub async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>, AppError> {
        let permission = sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.db)
            .await?;
        Ok(permission)
    }

    pub async fn create_permission(&self, input: CreatePermissionInput) -> Result<Permission, AppError> {
        if self.get_permission_by_name(&input.name).await?.is_some() {
            return Err(AppError::AlreadyExists(format!("permission {} already exists", input.name)));
        }

        let id = ids::generate("PERM");
        let permission = sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (id, name, resource_id, action_id, conditions, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.resource_id)
        .bind(&input.action_id)
        .bind(&input.conditions)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;
        Ok(permission)
    }

    /// §4.2 `AssignPermissionsToRole`: a set-union batch op, idempotent per
    /// permission id -- binding one already bound is a no-op, not an error.
    pub async fn assign_permissions_to_role(&self, role_id: &str, permission_ids: &[String]) -> Result<Vec<RoleBinding>, AppError> {
        self.require_role(role_id).await?;

        for permission_id in permission_ids {
            let existing: Option<RoleBinding> = sqlx::query_as(
                "SELECT * FROM role_bindings WHERE role_id = $1 AND permission_id = $2",
            )
            .bind(role_id)
            .bind(permission_id)
            .fetch_optional(&self.db)
            .await?;
            if existing.is_some() {
                continue;
            }

            let id = ids::generate("RBND");
            sqlx::query("INSERT INTO role_bindings (id, role_id, permission_id, created_at) VALUES ($1, $2, $3, $4)")
                .bind(&id)
                .bind(role_id)
                .bind(permission_id)
                .bind(Utc::now())
                .execute(&self.db)
                .await?;
        }

        self.invalidate_role_principals(role_id).await;

        let bindings = sqlx::query_as::<_, RoleBinding>("SELECT * FROM role_bindings WHERE role_id = $1")
            .bind(role_id)
            .fetch_all(&self.db)
            .await?;
        Ok(bindings)
    }

    pub async fn revoke_permission_from_role(&self, role_id: &str, permission_id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM role_bindings WHERE role_id = $1 AND permission_id = $2")
            .bind(role_id)
            .bind(permission_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("role binding not found".to_string()));
        }
        self.invalidate_role_principals(role_id).await;
        Ok(())
    }

    pub async fn get_role_permissions(&self, role_id: &str) -> Result<Vec<Permission>, AppError> {
        let rows = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.* FROM permissions p
            INNER JOIN role_bindings rb ON rb.permission_id = p.id
            WHERE rb.role_id = $1
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn get_role_resources(&self, role_id: &str) -> Result<Vec<Resource>, AppError> {
        let rows = sqlx::query_as::<_, Resource>(
            r#"
            SELECT DISTINCT r.* FROM resources r
            INNER JOIN permissions p ON p.resource_id = r.id
            INNER JOIN role_bindings rb ON rb.permission_id = p.id
            WHERE rb.role_id = $1
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// §4.2 `AssignResourceAction(role_id, resource_type, resource_id, action)`:
    /// a role-scoped grant on one resource instance, persisted here and mirrored
    /// to the relationship engine as a `role`-subject tuple in the same
    /// transaction as the SQL row (Invariant 2).
    pub async fn assign_resource_action(
        &self,
        role_id: &str,
        input: crate::models::AssignResourceActionInput,
        granted_by: Option<String>,
    ) -> Result<ResourceGrant, AppError> {
        self.require_role(role_id).await?;

        let existing: Option<ResourceGrant> = sqlx::query_as(
            "SELECT * FROM resource_grants WHERE role_id = $1 AND resource_type = $2 AND resource_id = $3 AND action = $4",
        )
        .bind(role_id)
        .bind(&input.resource_type)
        .bind(&input.resource_id)
        .bind(&input.action)
        .fetch_optional(&self.db)
        .await?;
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let id = ids::generate("RGRANT");
        let mut tx = self.db.begin().await?;

        let grant = sqlx::query_as::<_, ResourceGrant>(
            r#"
            INSERT INTO resource_grants (id, role_id, resource_type, resource_id, action, granted_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(role_id)
        .bind(&input.resource_type)
        .bind(&input.resource_id)
        .bind(&input.action)
        .bind(&granted_by)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let payload = json!({
            "resource_type": input.resource_type,
            "resource_id": input.resource_id,
            "relation": input.action,
            "subject_type": "role",
            "subject_id": role_id,
        });
        self.intents.enqueue_tx(&mut tx, IntentOperation::WriteRelationship, payload).await?;

        tx.commit().await?;

        self.invalidate_role_principals(role_id).await;
        Ok(grant)
    }

    pub async fn revoke_resource_action(&self, role_id: &str, resource_type: &str, resource_id: &str, action: &str) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            "DELETE FROM resource_grants WHERE role_id = $1 AND resource_type = $2 AND resource_id = $3 AND action = $4",
        )
        .bind(role_id)
        .bind(resource_type)
        .bind(resource_id)
        .bind(action)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("resource grant not found".to_string()));
        }

        let payload = json!({
            "resource_type": resource_type,
            "resource_id": resource_id,
            "relation": action,
            "subject_type": "role",
            "subject_id": role_id,
        });
        self.intents.enqueue_tx(&mut tx, IntentOperation::DeleteRelationship, payload).await?;

        tx.commit().await?;

        self.invalidate_role_principals(role_id).await;
        Ok(())
    }

    pub async fn get_resource_grant(&self, role_id: &str, resource_type: &str, resource_id: &str, action: &str) -> Result<Option<ResourceGrant>, AppError> {
        let grant = sqlx::query_as::<_, ResourceGrant>(
            "SELECT * FROM resource_grants WHERE role_id = $1 AND resource_type = $2 AND resource_id = $3 AND action = $4",
        )
        .bind(role_id)
        .bind(resource_type)
        .bind(resource_id)
        .bind(action)
        .fetch_optional(&self.db)
        .await?;
        Ok(grant)
    }

    pub async fn assign_role_to_principal(
        &self,
        principal_id: &str,
        input: AssignRoleInput,
        granted_by: Option<String>,
    ) -> Result<UserRole, AppError> {
        self.require_role(&input.role_id).await?;

        let id = ids::generate("URL");
        let user_role = sqlx::query_as::<_, UserRole>(
            r#"
            INSERT INTO user_roles (id, principal_id, role_id, scope_id, granted_by, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(principal_id)
        .bind(&input.role_id)
        .bind(&input.scope_id)
        .bind(&granted_by)
        .bind(Utc::now())
        .bind(input.expires_at)
        .fetch_one(&self.db)
        .await?;
        self.invalidate_principal(principal_id).await;
        Ok(user_role)
    }

    pub async fn revoke_role_from_principal(&self, principal_id: &str, role_id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE principal_id = $1 AND role_id = $2")
            .bind(principal_id)
            .bind(role_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("role assignment not found".to_string()));
        }
        self.invalidate_principal(principal_id).await;
        Ok(())
    }

    pub async fn get_principal_roles(&self, principal_id: &str) -> Result<Vec<UserRole>, AppError> {
        let now = Utc::now();
        let rows = sqlx::query_as::<_, UserRole>(
            "SELECT * FROM user_roles WHERE principal_id = $1 AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(principal_id)
        .bind(now)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn invalidate_principal(&self, principal_id: &str) {
        let _ = self.cache.delete_pattern(&format!("perm:{principal_id}:*")).await;
    }

    /// Invalidates every principal currently holding `role_id`, since a role's
    /// permission or resource-action set changed under them.
    async fn invalidate_role_principals(&self, role_id: &str) {
        let principals: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT principal_id FROM user_roles WHERE role_id = $1")
            .bind(role_id)
            .fetch_all(&self.db)
            .await
            .unwrap_or_default();
        for (principal_id,) in principals {
            self.invalidate_principal(&principal_id).await;
        }
    }
}
