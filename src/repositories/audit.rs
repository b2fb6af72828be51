//! C3 Audit Log persistence. Rows here are append-only: no `update` method
//! exists by design, and `archive_older_than` moves rows rather than mutating
//! them in place.

use chrono::Utc;
use sqlx::PgPool;

use crate::error::AppError;
use crate::ids;
use crate::models::{AuditEvent, AuditQuery, EmitAuditEventInput};

#[derive(Clone)]
pub struct AuditRepository {
    db: PgPool,
}

impl AuditRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn emit(&self, input: EmitAuditEventInput) -> Result<AuditEvent, AppError> {
        let id = ids::generate("AUD");
        let event = sqlx::query_as::<_, AuditEvent>(
            r#"
            INSERT INTO audit_events (
                id, actor_id, action, resource_type, resource_id, status, priority,
                details, ip_address, request_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&input.actor_id)
        .bind(&input.action)
        .bind(&input.resource_type)
        .bind(&input.resource_id)
        .bind(input.status)
        .bind(input.priority)
        .bind(&input.details)
        .bind(&input.ip_address)
        .bind(&input.request_id)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;
        Ok(event)
    }

    pub async fn query(&self, filter: AuditQuery) -> Result<Vec<AuditEvent>, AppError> {
        let mut sql = String::from("SELECT * FROM audit_events WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if filter.actor_id.is_some() {
            binds.push("actor_id".to_string());
        }
        if filter.action.is_some() {
            binds.push("action".to_string());
        }
        if filter.resource_type.is_some() {
            binds.push("resource_type".to_string());
        }
        if filter.resource_id.is_some() {
            binds.push("resource_id".to_string());
        }
        if filter.status.is_some() {
            binds.push("status".to_string());
        }
        if filter.since.is_some() {
            binds.push("since".to_string());
        }
        if filter.until.is_some() {
            binds.push("until".to_string());
        }

        let mut idx = 1;
        for column in &binds {
            match column.as_str() {
                "since" => sql.push_str(&format!(" AND created_at >= ${idx}")),
                "until" => sql.push_str(&format!(" AND created_at <= ${idx}")),
                other => sql.push_str(&format!(" AND {other} = ${idx}")),
            }
            idx += 1;
        }
        sql.push_str(&format!(" ORDER BY created_at DESC OFFSET ${idx} LIMIT ${}", idx + 1));

        let mut query = sqlx::query_as::<_, AuditEvent>(&sql);
        for column in &binds {
            query = match column.as_str() {
                "actor_id" => query.bind(filter.actor_id.clone()),
                "action" => query.bind(filter.action.clone()),
                "resource_type" => query.bind(filter.resource_type.clone()),
                "resource_id" => query.bind(filter.resource_id.clone()),
                "status" => query.bind(filter.status),
                "since" => query.bind(filter.since),
                "until" => query.bind(filter.until),
                _ => unreachable!(),
            };
        }
        query = query.bind(filter.offset).bind(filter.limit);

        let rows = query.fetch_all(&self.db).await?;
        Ok(rows)
    }

    /// Moves rows older than `cutoff` into `audit_events_archive`, leaving the
    /// hot table free of anything it wouldn't typically need for live lookups.
    pub async fn archive_older_than(&self, cutoff: chrono::DateTime<Utc>) -> Result<u64, AppError> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO audit_events_archive
            SELECT * FROM audit_events WHERE created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM audit_events WHERE created_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
