//! §4.3 non-persistence half of the Audit Log: a bounded in-process buffer
//! drained by a dedicated background task, so emitting an audit event never
//! blocks the request that triggered it. `security_event` priority bypasses
//! the buffer entirely and writes synchronously, trading a small latency hit
//! for the guarantee that a crash can never silently drop it.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::models::{AuditPriority, EmitAuditEventInput};
use crate::repositories::AuditRepository;

const BUFFER_CAPACITY: usize = 4096;

#[derive(Clone)]
pub struct AuditSink {
    sender: mpsc::Sender<EmitAuditEventInput>,
}

impl AuditSink {
    pub fn spawn(repo: Arc<AuditRepository>) -> Self {
        let (sender, mut receiver) = mpsc::channel::<EmitAuditEventInput>(BUFFER_CAPACITY);

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(error) = repo.emit(event).await {
                    tracing::error!(%error, "failed to persist buffered audit event");
                    counter!("audit_sink_write_failures_total").increment(1);
                }
            }
        });

        Self { sender }
    }

    pub async fn emit(&self, repo: &AuditRepository, event: EmitAuditEventInput) -> Result<(), AppError> {
        if matches!(event.priority, AuditPriority::SecurityEvent) {
            repo.emit(event).await?;
            return Ok(());
        }

        if self.sender.try_send(event.clone()).is_err() {
            counter!("audit_sink_buffer_full_total").increment(1);
            tracing::warn!("audit buffer full, writing event synchronously");
            repo.emit(event).await?;
        }
        Ok(())
    }
}
