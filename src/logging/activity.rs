use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// One row of the activity trail (spec C13). Distinct from `tracing`'s
/// structured logs: this is an application-level audit record of what
/// happened to a document or query, kept batched and off the hot path.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    pub owner_id: String,
    pub event_type: ActivityEventType,
    pub document_id: Option<Uuid>,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEventType {
    DocumentIngested,
    DocumentDeleted,
    ContextualizationCompleted,
    ContextualizationDegraded,
    RetrievalDegraded,
}

const CHANNEL_CAPACITY: usize = 4096;
const BATCH_SIZE: usize = 64;

/// Non-blocking activity logger: callers push onto a bounded `flume`
/// channel and a background worker drains it in batches, so a slow sink
/// (a file, a downstream collector) never adds latency to the request
/// path that generated the event (spec C13).
#[derive(Clone)]
pub struct ActivityLogger {
    sender: flume::Sender<ActivityEvent>,
}

impl ActivityLogger {
    /// Spawns the background drain worker and returns a handle. The
    /// worker runs for the lifetime of the process; there is no shutdown
    /// signal because a skipped final batch is an acceptable loss on
    /// process exit (spec C13 is observability, not a durability contract).
    pub fn spawn() -> Arc<Self> {
        let (sender, receiver) = flume::bounded(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut batch = Vec::with_capacity(BATCH_SIZE);
            while let Ok(event) = receiver.recv_async().await {
                batch.push(event);
                while batch.len() < BATCH_SIZE {
                    match receiver.try_recv() {
                        Ok(event) => batch.push(event),
                        Err(_) => break,
                    }
                }
                flush(&batch);
                batch.clear();
            }
        });

        Arc::new(Self { sender })
    }

    pub fn record(&self, event: ActivityEvent) {
        if self.sender.try_send(event).is_err() {
            warn!("activity log channel full, dropping event");
        }
    }

    pub fn document_ingested(&self, owner_id: &str, document_id: Uuid, detail: impl Into<String>) {
        self.record(ActivityEvent {
            owner_id: owner_id.to_string(),
            event_type: ActivityEventType::DocumentIngested,
            document_id: Some(document_id),
            detail: detail.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn document_deleted(&self, owner_id: &str, document_id: Uuid) {
        self.record(ActivityEvent {
            owner_id: owner_id.to_string(),
            event_type: ActivityEventType::DocumentDeleted,
            document_id: Some(document_id),
            detail: String::new(),
            timestamp: Utc::now(),
        });
    }

    pub fn contextualization_completed(
        &self,
        owner_id: &str,
        document_id: Uuid,
        detail: impl Into<String>,
    ) {
        self.record(ActivityEvent {
            owner_id: owner_id.to_string(),
            event_type: ActivityEventType::ContextualizationCompleted,
            document_id: Some(document_id),
            detail: detail.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn contextualization_degraded(
        &self,
        owner_id: &str,
        document_id: Uuid,
        reason: impl Into<String>,
    ) {
        self.record(ActivityEvent {
            owner_id: owner_id.to_string(),
            event_type: ActivityEventType::ContextualizationDegraded,
            document_id: Some(document_id),
            detail: reason.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn retrieval_degraded(&self, owner_id: &str, reason: impl Into<String>) {
        self.record(ActivityEvent {
            owner_id: owner_id.to_string(),
            event_type: ActivityEventType::RetrievalDegraded,
            document_id: None,
            detail: reason.into(),
            timestamp: Utc::now(),
        });
    }
}

fn flush(batch: &[ActivityEvent]) {
    for event in batch {
        match serde_json::to_string(event) {
            Ok(line) => info!(target: "activity", event = %line, "activity"),
            Err(e) => error!(error = %e, "failed to serialize activity event"),
        }
    }
}
