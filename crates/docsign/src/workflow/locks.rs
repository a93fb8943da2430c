use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// In-process registry of documents currently being advanced.
#[derive(Debug, Clone, Default)]
pub struct DocumentLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id`, or returns `None` while another guard holds it.
    pub fn try_acquire(&self, id: &str) -> Option<DocumentGuard> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(id.to_string()) {
            return None;
        }
        Some(DocumentGuard {
            id: id.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

/// Releases the document when dropped.
#[derive(Debug)]
pub struct DocumentGuard {
    id: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for DocumentGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
