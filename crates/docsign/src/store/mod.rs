//! Document store abstraction.
//!
//! The workflow only needs a handful of operations from whatever holds the
//! documents: read bytes and name, learn which folder a document sits in,
//! overwrite content, rename, move between folders and list a folder.
//! Every failure surfaces as a [`StoreError`]; nothing is retried here.

pub mod folder;
pub mod memory;

use serde::Serialize;

use crate::error::StoreError;

pub use folder::FolderStore;
pub use memory::{MemoryStore, StoreOp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEntry {
    pub id: String,
    pub name: String,
}

pub trait DocumentStore: Send + Sync {
    fn get_content(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    fn get_name(&self, id: &str) -> Result<String, StoreError>;

    /// Folders that currently contain the document.
    fn parents(&self, id: &str) -> Result<Vec<String>, StoreError>;

    /// Replaces the document's content, keeping its id, name and folder.
    fn put_content(&self, id: &str, content: &[u8]) -> Result<(), StoreError>;

    fn rename(&self, id: &str, name: &str) -> Result<(), StoreError>;

    /// Moves the document out of `from` into `to`. Fails with
    /// [`StoreError::NotInFolder`] when it is not currently in `from`.
    fn move_document(&self, id: &str, from: &str, to: &str) -> Result<(), StoreError>;

    /// Documents directly inside `folder`, ordered by name.
    fn list(&self, folder: &str) -> Result<Vec<DocumentEntry>, StoreError>;
}

/// Rejects ids that could escape a storage root when used as a path
/// component.
pub(crate) fn validate_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\', '\0'])
        && id.trim() == id;
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}
