use crate::status::{StatusEvent, StatusStore};

use super::error::Step;

/// Events emitted by the workflow while advancing a document.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Step(Step),
    Completed { stage: String },
    Failed { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for callers that do not track progress.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges workflow events into the status store, so pollers and
/// subscribers see the signing steps.
pub struct StatusProgress {
    document_id: String,
    status: StatusStore,
}

impl StatusProgress {
    pub fn new(document_id: &str, status: StatusStore) -> Self {
        Self {
            document_id: document_id.to_string(),
            status,
        }
    }
}

impl ProgressReporter for StatusProgress {
    fn report(&self, event: ProgressEvent) {
        let event = match event {
            ProgressEvent::Step(step) => StatusEvent::signing(&self.document_id, step),
            ProgressEvent::Completed { stage } => StatusEvent::completed(&self.document_id, &stage),
            ProgressEvent::Failed { error } => StatusEvent::failed(&self.document_id, &error),
        };
        self.status.set_status(event);
    }
}
