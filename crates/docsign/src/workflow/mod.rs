//! Stage advance orchestration: fetch, validate, route, anchor, sign,
//! persist, rename, move and cleanup for one document at a time.

pub mod context;
pub mod error;
pub mod locks;
pub mod overview;
pub mod progress;
pub mod runner;

pub use context::{AdvanceRequest, SubmissionMetadata};
pub use error::{Step, WorkflowError};
pub use locks::{DocumentGuard, DocumentLocks};
pub use overview::{GroupOverview, StageOverview};
pub use progress::{NoopProgress, ProgressEvent, ProgressReporter, StatusProgress};
pub use runner::{Advance, Workflow};
