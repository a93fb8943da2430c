//! Test harness for isolated workflow runs.
//!
//! The `TestHarness` struct provides:
//! - A temp-dir backed `FolderStore` with one folder per stage
//! - A `DocumentCache` and `StatusStore` wired into the workflow
//! - Helpers to submit documents and inspect where they ended up

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use docsign::config::Config;
use docsign::workflow::{Advance, StatusProgress, SubmissionMetadata, Workflow, WorkflowError};
use docsign::{
    AdvanceRequest, DocumentCache, DocumentStore, FolderStore, StageTable, StatusStore,
};

use super::builders::{builtin_config, signature_data_url};

pub struct TestHarness {
    temp_dir: TempDir,
    pub store: Arc<FolderStore>,
    pub cache: Arc<DocumentCache>,
    pub status: StatusStore,
    pub stages: Arc<StageTable>,
    pub workflow: Workflow,
}

impl TestHarness {
    /// Harness over the built-in approval chain.
    pub fn new() -> Self {
        Self::with_config(builtin_config())
    }

    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(
            FolderStore::new(temp_dir.path().join("store")).expect("Failed to create store"),
        );
        let cache = Arc::new(
            DocumentCache::new(temp_dir.path().join("cache")).expect("Failed to create cache"),
        );
        let status = StatusStore::new(&config.status);
        let stages = Arc::new(StageTable::from_config(&config).expect("Invalid stage table"));
        let workflow =
            Workflow::new(Arc::clone(&stages), store.clone()).with_cache(Arc::clone(&cache));

        Self {
            temp_dir,
            store,
            cache,
            status,
            stages,
            workflow,
        }
    }

    /// Places a document in `folder` and returns its id.
    pub fn submit(&self, folder: &str, name: &str, content: &[u8]) -> String {
        self.store
            .insert(folder, name, content)
            .expect("Failed to insert document")
    }

    /// Advances with a fresh 200x80 signature, reporting into the status
    /// store.
    pub fn advance(
        &self,
        id: &str,
        stage: &str,
        metadata: SubmissionMetadata,
    ) -> Result<Advance, WorkflowError> {
        let request = AdvanceRequest {
            document_id: id.to_string(),
            stage: stage.to_string(),
            signature: signature_data_url(200, 80),
            metadata,
        };
        let progress = StatusProgress::new(id, self.status.clone());
        self.workflow.run(&request, &progress)
    }

    pub fn folder_of(&self, id: &str) -> String {
        self.store
            .parents(id)
            .expect("Failed to read parents")
            .into_iter()
            .next()
            .expect("Document has no folder")
    }

    pub fn name_of(&self, id: &str) -> String {
        self.store.get_name(id).expect("Failed to read name")
    }

    pub fn content_of(&self, id: &str) -> Vec<u8> {
        self.store.get_content(id).expect("Failed to read content")
    }
}
