use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SubmissionCode;
use crate::error::{PdfError, StoreError};
use crate::router::CodeError;

/// Steps of a single stage advance, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Fetch,
    Validate,
    Route,
    Anchor,
    Sign,
    Persist,
    Rename,
    Move,
    Cleanup,
    List,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Validate => "validate",
            Step::Route => "route",
            Step::Anchor => "anchor",
            Step::Sign => "sign",
            Step::Persist => "persist",
            Step::Rename => "rename",
            Step::Move => "move",
            Step::Cleanup => "cleanup",
            Step::List => "list",
        }
    }

    /// True for steps that change the document in the store.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Step::Persist | Step::Rename | Step::Move)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn join_steps(steps: &[Step]) -> String {
    steps
        .iter()
        .map(Step::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Unknown stage '{0}'")]
    UnknownStage(String),

    #[error("Document '{0}' is already being processed")]
    DocumentBusy(String),

    #[error("Missing required field '{field}'")]
    MissingRequiredField { field: &'static str },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("None of the keywords for stage '{stage}' found on the first page: {}", .keywords.join(", "))]
    KeywordNotFound { stage: String, keywords: Vec<String> },

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Document '{document_id}' is not a PDF")]
    UnsupportedFormat { document_id: String },

    #[error("Unreadable PDF: {0}")]
    InvalidPdf(#[source] PdfError),

    #[error("Cannot determine submission code: {source}")]
    UnresolvableSubmissionCode {
        name: String,
        #[source]
        source: CodeError,
    },

    #[error("Stage '{stage}' has no route for code {code}")]
    NoRoutingEntry { stage: String, code: SubmissionCode },

    #[error("Stage '{stage}' has no folder configured")]
    UnresolvableFolder { stage: String },

    #[error("Store failure during {step}: {source}")]
    StoreTransport {
        step: Step,
        #[source]
        source: StoreError,
    },

    #[error("Document '{document_id}' left inconsistent: completed [{}], {failed} failed: {source}", join_steps(.completed))]
    PartiallyApplied {
        document_id: String,
        completed: Vec<Step>,
        failed: Step,
        #[source]
        source: Box<WorkflowError>,
    },
}

impl WorkflowError {
    pub(crate) fn store(step: Step) -> impl FnOnce(StoreError) -> WorkflowError {
        move |source| WorkflowError::StoreTransport { step, source }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::UnknownStage(_) => "unknown_stage",
            WorkflowError::DocumentBusy(_) => "document_busy",
            WorkflowError::MissingRequiredField { .. } => "missing_required_field",
            WorkflowError::InvalidField { .. } => "invalid_field",
            WorkflowError::KeywordNotFound { .. } => "keyword_not_found",
            WorkflowError::MalformedSignature(_) => "malformed_signature",
            WorkflowError::UnsupportedFormat { .. } => "unsupported_format",
            WorkflowError::InvalidPdf(_) => "invalid_pdf",
            WorkflowError::UnresolvableSubmissionCode { .. } => "unresolvable_submission_code",
            WorkflowError::NoRoutingEntry { .. } => "no_routing_entry",
            WorkflowError::UnresolvableFolder { .. } => "unresolvable_folder",
            WorkflowError::StoreTransport { .. } => "store_transport",
            WorkflowError::PartiallyApplied { .. } => "partially_applied",
        }
    }

    /// Caller input problems, as opposed to document, configuration or
    /// store problems.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WorkflowError::MissingRequiredField { .. }
                | WorkflowError::InvalidField { .. }
                | WorkflowError::MalformedSignature(_)
        )
    }

    /// True when the document is absent from the store or from the folder
    /// the caller expected it in.
    pub fn is_not_found(&self) -> bool {
        match self {
            WorkflowError::StoreTransport { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True when the store was changed before the failure.
    pub fn is_partial(&self) -> bool {
        matches!(self, WorkflowError::PartiallyApplied { .. })
    }
}

impl From<PdfError> for WorkflowError {
    fn from(e: PdfError) -> Self {
        match e {
            PdfError::MalformedSignature(reason) => WorkflowError::MalformedSignature(reason),
            other => WorkflowError::InvalidPdf(other),
        }
    }
}
