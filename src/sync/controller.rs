//! C9 Synchronization Controller: drains queued intents into the
//! relationship engine in the background, independent of the request that
//! enqueued them, so a slow or briefly-unavailable engine never blocks a
//! write against Postgres.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::interval;

use crate::rebac::RelationshipEngineClient;

use super::intents::{Intent, IntentOperation, IntentRepository, IntentStatus};

const DRAIN_INTERVAL: Duration = Duration::from_secs(2);
const RECONCILE_INTERVAL: Duration = Duration::from_secs(300);
const BATCH_SIZE: i64 = 50;
const RECONCILE_SAMPLE_SIZE: i64 = 25;
const DEAD_LETTER_THRESHOLD: i32 = 8;
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct SyncController {
    intents: Arc<IntentRepository>,
    rebac: Arc<RelationshipEngineClient>,
    shutdown: watch::Receiver<bool>,
}

impl SyncController {
    pub fn new(intents: Arc<IntentRepository>, rebac: Arc<RelationshipEngineClient>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            intents,
            rebac,
            shutdown,
        }
    }

    /// Requeues anything left `in_flight` from a previous process that died
    /// mid-drain, so a restart doesn't strand those intents forever.
    pub async fn replay_on_startup(&self) {
        match self.intents.pending_on_startup().await {
            Ok(stuck) if !stuck.is_empty() => {
                tracing::warn!(count = stuck.len(), "requeuing intents left in_flight by a previous process");
                for intent in stuck {
                    let _ = self
                        .intents
                        .mark_failed(&intent.id, "requeued on startup", chrono::Utc::now(), DEAD_LETTER_THRESHOLD)
                        .await;
                }
            }
            Ok(_) => {}
            Err(error) => tracing::error!(%error, "failed to inspect in_flight intents on startup"),
        }
    }

    pub async fn run(mut self) {
        self.replay_on_startup().await;

        let mut drain_tick = interval(DRAIN_INTERVAL);
        let mut reconcile_tick = interval(RECONCILE_INTERVAL);

        loop {
            tokio::select! {
                _ = drain_tick.tick() => self.drain_once().await,
                _ = reconcile_tick.tick() => self.reconcile_once().await,
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!("synchronization controller shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn drain_once(&self) {
        let batch = match self.intents.claim_batch(BATCH_SIZE).await {
            Ok(batch) => batch,
            Err(error) => {
                tracing::error!(%error, "failed to claim sync intent batch");
                return;
            }
        };

        for intent in batch {
            self.apply(&intent).await;
        }
    }

    async fn apply(&self, intent: &Intent) {
        let result = match intent.operation {
            IntentOperation::WriteRelationship => self.apply_write(&intent.payload).await,
            IntentOperation::DeleteRelationship => self.apply_delete(&intent.payload).await,
        };

        match result {
            Ok(()) => {
                if let Err(error) = self.intents.mark_applied(&intent.id).await {
                    tracing::error!(%error, intent_id = %intent.id, "failed to mark intent applied");
                }
            }
            Err(error) => {
                let next_attempt = chrono::Utc::now() + chrono::Duration::from_std(backoff_delay(intent.attempts)).unwrap();
                tracing::warn!(intent_id = %intent.id, attempts = intent.attempts, %error, "sync intent failed, will retry");
                if let Err(mark_err) = self
                    .intents
                    .mark_failed(&intent.id, &error.to_string(), next_attempt, DEAD_LETTER_THRESHOLD)
                    .await
                {
                    tracing::error!(error = %mark_err, intent_id = %intent.id, "failed to record intent failure");
                }
            }
        }
    }

    async fn apply_write(&self, payload: &Value) -> Result<(), crate::error::AppError> {
        let tuple = parse_relationship_payload(payload)?;
        self.rebac
            .write_relationship(&tuple.resource_type, &tuple.resource_id, &tuple.relation, &tuple.subject_type, &tuple.subject_id)
            .await
    }

    async fn apply_delete(&self, payload: &Value) -> Result<(), crate::error::AppError> {
        let tuple = parse_relationship_payload(payload)?;
        self.rebac
            .delete_relationships(&tuple.resource_type, Some(&tuple.resource_id), Some(&tuple.relation))
            .await
    }

    async fn reconcile_once(&self) {
        let sample = match self.intents.sample_applied(RECONCILE_SAMPLE_SIZE).await {
            Ok(sample) => sample,
            Err(error) => {
                tracing::error!(%error, "failed to sample applied intents for reconciliation");
                return;
            }
        };

        for intent in sample {
            if let IntentOperation::WriteRelationship = intent.operation {
                if let Ok(tuple) = parse_relationship_payload(&intent.payload) {
                    match self
                        .rebac
                        .check_permission(&tuple.resource_type, &tuple.resource_id, &tuple.relation, &tuple.subject_type, &tuple.subject_id)
                        .await
                    {
                        Ok(false) => tracing::warn!(intent_id = %intent.id, "reconciliation found an applied intent missing from the relationship engine"),
                        Ok(true) => {}
                        Err(error) => tracing::error!(%error, intent_id = %intent.id, "reconciliation check failed"),
                    }
                }
            }
        }
    }
}

struct RelationshipTuple {
    resource_type: String,
    resource_id: String,
    relation: String,
    subject_type: String,
    subject_id: String,
}

fn parse_relationship_payload(payload: &Value) -> Result<RelationshipTuple, crate::error::AppError> {
    let get = |key: &str| -> Result<String, crate::error::AppError> {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| crate::error::AppError::Internal(format!("sync intent payload missing {key}")))
    };
    Ok(RelationshipTuple {
        resource_type: get("resource_type")?,
        resource_id: get("resource_id")?,
        relation: get("relation")?,
        subject_type: payload
            .get("subject_type")
            .and_then(Value::as_str)
            .unwrap_or("user")
            .to_string(),
        subject_id: get("subject_id")?,
    })
}

fn backoff_delay(attempts: i32) -> Duration {
    let millis = 500u64.saturating_mul(1u64 << attempts.min(10) as u32);
    Duration::from_millis(millis).min(MAX_BACKOFF)
}

impl IntentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentStatus::Applied | IntentStatus::Dead)
    }
}
