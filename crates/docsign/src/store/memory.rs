use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::error::StoreError;
use crate::store::{DocumentEntry, DocumentStore};

/// Store operations, used to inject failures and to inspect what a caller
/// changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetContent,
    GetName,
    Parents,
    PutContent,
    Rename,
    Move,
    List,
}

#[derive(Debug, Clone)]
struct MemoryDocument {
    name: String,
    content: Vec<u8>,
    parents: Vec<String>,
}

/// In-process store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, MemoryDocument>>,
    failures: Mutex<HashSet<StoreOp>>,
    journal: Mutex<Vec<(StoreOp, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &str, folder: &str, name: &str, content: Vec<u8>) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.to_string(),
                MemoryDocument {
                    name: name.to_string(),
                    content,
                    parents: vec![folder.to_string()],
                },
            );
    }

    /// Makes every later call of `op` fail with a transport error.
    pub fn fail_on(&self, op: StoreOp) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op);
    }

    pub fn clear_failures(&self) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Successful mutations (content writes, renames, moves) in call order.
    pub fn mutations(&self) -> Vec<(StoreOp, String)> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        let failing = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&op);
        if failing {
            Err(StoreError::Transport(format!("injected failure on {:?}", op)))
        } else {
            Ok(())
        }
    }

    fn record(&self, op: StoreOp, id: &str) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((op, id.to_string()));
    }

    fn read<T>(&self, id: &str, f: impl FnOnce(&MemoryDocument) -> T) -> Result<T, StoreError> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        documents.get(id).map(f).ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })
    }

    fn write<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut MemoryDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let document = documents.get_mut(id).ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })?;
        f(document)
    }
}

impl DocumentStore for MemoryStore {
    fn get_content(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.check(StoreOp::GetContent)?;
        self.read(id, |doc| doc.content.clone())
    }

    fn get_name(&self, id: &str) -> Result<String, StoreError> {
        self.check(StoreOp::GetName)?;
        self.read(id, |doc| doc.name.clone())
    }

    fn parents(&self, id: &str) -> Result<Vec<String>, StoreError> {
        self.check(StoreOp::Parents)?;
        self.read(id, |doc| doc.parents.clone())
    }

    fn put_content(&self, id: &str, content: &[u8]) -> Result<(), StoreError> {
        self.check(StoreOp::PutContent)?;
        self.write(id, |doc| {
            doc.content = content.to_vec();
            Ok(())
        })?;
        self.record(StoreOp::PutContent, id);
        Ok(())
    }

    fn rename(&self, id: &str, name: &str) -> Result<(), StoreError> {
        self.check(StoreOp::Rename)?;
        self.write(id, |doc| {
            doc.name = name.to_string();
            Ok(())
        })?;
        self.record(StoreOp::Rename, id);
        Ok(())
    }

    fn move_document(&self, id: &str, from: &str, to: &str) -> Result<(), StoreError> {
        self.check(StoreOp::Move)?;
        self.write(id, |doc| {
            let Some(position) = doc.parents.iter().position(|p| p == from) else {
                return Err(StoreError::NotInFolder {
                    id: id.to_string(),
                    folder: from.to_string(),
                });
            };
            doc.parents.remove(position);
            if !doc.parents.iter().any(|p| p == to) {
                doc.parents.push(to.to_string());
            }
            Ok(())
        })?;
        self.record(StoreOp::Move, id);
        Ok(())
    }

    fn list(&self, folder: &str) -> Result<Vec<DocumentEntry>, StoreError> {
        self.check(StoreOp::List)?;
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<DocumentEntry> = documents
            .iter()
            .filter(|(_, doc)| doc.parents.iter().any(|p| p == folder))
            .map(|(id, doc)| DocumentEntry {
                id: id.clone(),
                name: doc.name.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }
}
