//! An intent is one pending change to the relationship engine that Postgres
//! has already committed to (e.g. "grant user U the editor relation on
//! workplace W"). The intent id is deterministic -- a hash of the operation
//! and its payload -- so writing the same intent twice (a retried request,
//! a replayed transaction) coalesces onto the same row instead of queuing a
//! duplicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    InFlight,
    Applied,
    Failed,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntentOperation {
    WriteRelationship,
    DeleteRelationship,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Intent {
    pub id: String,
    pub operation: IntentOperation,
    pub payload: Value,
    pub status: IntentStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
}

pub fn deterministic_id(operation: IntentOperation, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{operation:?}").as_bytes());
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("INT{}", hex::encode(&digest[..12]))
}

#[derive(Clone)]
pub struct IntentRepository {
    db: PgPool,
}

impl IntentRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn enqueue(&self, operation: IntentOperation, payload: Value) -> Result<Intent, AppError> {
        let id = deterministic_id(operation, &payload);
        let now = Utc::now();
        let intent = sqlx::query_as::<_, Intent>(
            r#"
            INSERT INTO sync_intents (id, operation, payload, status, attempts, last_error, created_at, updated_at, next_attempt_at)
            VALUES ($1, $2, $3, $4, 0, NULL, $5, $5, $5)
            ON CONFLICT (id) DO UPDATE SET updated_at = $5
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(operation)
        .bind(&payload)
        .bind(IntentStatus::Pending)
        .bind(now)
        .fetch_one(&self.db)
        .await?;
        Ok(intent)
    }

    /// Same enqueue, but inside an already-open transaction, so a policy
    /// mutation and the intent it produces commit or roll back together
    /// (§4.9: every relationship-engine tuple traces back to a committed SQL
    /// row).
    pub async fn enqueue_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        operation: IntentOperation,
        payload: Value,
    ) -> Result<Intent, AppError> {
        let id = deterministic_id(operation, &payload);
        let now = Utc::now();
        let intent = sqlx::query_as::<_, Intent>(
            r#"
            INSERT INTO sync_intents (id, operation, payload, status, attempts, last_error, created_at, updated_at, next_attempt_at)
            VALUES ($1, $2, $3, $4, 0, NULL, $5, $5, $5)
            ON CONFLICT (id) DO UPDATE SET updated_at = $5
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(operation)
        .bind(&payload)
        .bind(IntentStatus::Pending)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        Ok(intent)
    }

    pub async fn claim_batch(&self, limit: i64) -> Result<Vec<Intent>, AppError> {
        let now = Utc::now();
        let rows = sqlx::query_as::<_, Intent>(
            r#"
            UPDATE sync_intents
            SET status = $1, updated_at = $2
            WHERE id IN (
                SELECT id FROM sync_intents
                WHERE status IN ($3, $4) AND next_attempt_at <= $2
                ORDER BY next_attempt_at
                LIMIT $5
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(IntentStatus::InFlight)
        .bind(now)
        .bind(IntentStatus::Pending)
        .bind(IntentStatus::Failed)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn mark_applied(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE sync_intents SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(IntentStatus::Applied)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: &str, error: &str, next_attempt_at: DateTime<Utc>, dead_letter_threshold: i32) -> Result<(), AppError> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT attempts FROM sync_intents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        let attempts = row.map(|r| r.0).unwrap_or(0) + 1;
        let status = if attempts >= dead_letter_threshold {
            IntentStatus::Dead
        } else {
            IntentStatus::Failed
        };

        sqlx::query(
            "UPDATE sync_intents SET status = $1, attempts = $2, last_error = $3, updated_at = $4, next_attempt_at = $5 WHERE id = $6",
        )
        .bind(status)
        .bind(attempts)
        .bind(error)
        .bind(Utc::now())
        .bind(next_attempt_at)
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn pending_on_startup(&self) -> Result<Vec<Intent>, AppError> {
        let rows = sqlx::query_as::<_, Intent>(
            "SELECT * FROM sync_intents WHERE status = $1 ORDER BY created_at",
        )
        .bind(IntentStatus::InFlight)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Samples a handful of already-applied intents for periodic reconciliation
    /// against the relationship engine, rather than re-verifying the whole table.
    pub async fn sample_applied(&self, sample_size: i64) -> Result<Vec<Intent>, AppError> {
        let rows = sqlx::query_as::<_, Intent>(
            "SELECT * FROM sync_intents WHERE status = $1 ORDER BY RANDOM() LIMIT $2",
        )
        .bind(IntentStatus::Applied)
        .bind(sample_size)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
