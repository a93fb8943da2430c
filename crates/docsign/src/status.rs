//! Per-document status tracking for polling clients.
//!
//! Statuses live in a bounded TTL cache: settled statuses (ready, completed,
//! failed) expire after `status.ttl_secs`, in-flight ones after the longer
//! `status.in_flight_ttl_secs`, so abandoned downloads cannot pin memory.
//! Every change is also broadcast to subscribers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::StatusConfig;
use crate::workflow::Step;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPhase {
    Queued,
    Downloading,
    Ready,
    Signing,
    Completed,
    Failed,
}

impl DocumentPhase {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            DocumentPhase::Ready | DocumentPhase::Completed | DocumentPhase::Failed
        )
    }
}

impl std::fmt::Display for DocumentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentPhase::Queued => write!(f, "Queued"),
            DocumentPhase::Downloading => write!(f, "Downloading"),
            DocumentPhase::Ready => write!(f, "Ready"),
            DocumentPhase::Signing => write!(f, "Signing"),
            DocumentPhase::Completed => write!(f, "Completed"),
            DocumentPhase::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub document_id: String,
    pub phase: DocumentPhase,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Workflow step in progress (signing only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
    /// Stage the document ended in (completion only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusEvent {
    pub fn new(document_id: &str, phase: DocumentPhase, message: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            phase,
            message: message.to_string(),
            timestamp: Utc::now(),
            step: None,
            stage: None,
            error: None,
        }
    }

    pub fn signing(document_id: &str, step: Step) -> Self {
        Self {
            step: Some(step),
            ..Self::new(document_id, DocumentPhase::Signing, &format!("Signing: {}", step))
        }
    }

    pub fn completed(document_id: &str, stage: &str) -> Self {
        Self {
            stage: Some(stage.to_string()),
            ..Self::new(
                document_id,
                DocumentPhase::Completed,
                &format!("Document is now at stage {}", stage),
            )
        }
    }

    pub fn failed(document_id: &str, error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(document_id, DocumentPhase::Failed, "Processing failed")
        }
    }
}

struct StatusExpiry {
    settled: Duration,
    in_flight: Duration,
}

impl StatusExpiry {
    fn ttl(&self, event: &StatusEvent) -> Duration {
        if event.phase.is_settled() {
            self.settled
        } else {
            self.in_flight
        }
    }
}

impl Expiry<String, StatusEvent> for StatusExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StatusEvent,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.ttl(value))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StatusEvent,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.ttl(value))
    }
}

#[derive(Clone)]
pub struct StatusStore {
    entries: Cache<String, StatusEvent>,
    sender: Arc<broadcast::Sender<StatusEvent>>,
}

impl StatusStore {
    pub fn new(config: &StatusConfig) -> Self {
        Self::with_ttls(
            Duration::from_secs(config.ttl_secs),
            Duration::from_secs(config.in_flight_ttl_secs),
            config.capacity,
            config.channel_capacity,
        )
    }

    pub fn with_ttls(
        settled: Duration,
        in_flight: Duration,
        capacity: u64,
        channel_capacity: usize,
    ) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .expire_after(StatusExpiry { settled, in_flight })
            .build();
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            entries,
            sender: Arc::new(sender),
        }
    }

    pub fn set_status(&self, event: StatusEvent) {
        tracing::debug!(
            document_id = %crate::sanitize::short_id(&event.document_id),
            phase = %event.phase,
            "status changed"
        );
        self.entries
            .insert(event.document_id.clone(), event.clone());
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn set_phase(&self, document_id: &str, phase: DocumentPhase, message: &str) {
        self.set_status(StatusEvent::new(document_id, phase, message));
    }

    pub fn get_status(&self, document_id: &str) -> Option<StatusEvent> {
        self.entries.get(document_id)
    }

    pub fn phase(&self, document_id: &str) -> Option<DocumentPhase> {
        self.get_status(document_id).map(|event| event.phase)
    }

    pub fn is_ready(&self, document_id: &str) -> bool {
        self.phase(document_id) == Some(DocumentPhase::Ready)
    }

    pub fn remove(&self, document_id: &str) {
        self.entries.invalidate(document_id);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}
