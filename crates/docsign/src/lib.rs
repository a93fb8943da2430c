pub mod access;
pub mod cache;
pub mod compositor;
pub mod config;
pub mod error;
pub mod locator;
pub mod pdf;
pub mod router;
pub mod sanitize;
pub mod secrets;
pub mod stage;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod worker;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use access::{AccessError, AccessGate, AccessGrants};
pub use cache::DocumentCache;
pub use compositor::{composite, SignatureImage};
pub use config::{load_config, Config, SubmissionCode};
pub use error::{ConfigError, DocsignError, PdfError, Result, StoreError, WorkerError};
pub use locator::{locate, Anchor, KeywordSet};
pub use router::{CodeParser, StageRouter};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use stage::{Stage, StageId, StageTable};
pub use status::{DocumentPhase, StatusEvent, StatusStore};
pub use store::{DocumentEntry, DocumentStore, FolderStore, MemoryStore};
pub use telemetry::init_tracing;
pub use worker::Prefetcher;
pub use workflow::{Advance, AdvanceRequest, SubmissionMetadata, Workflow, WorkflowError};
