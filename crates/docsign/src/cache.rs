//! Local cache of materialised document bytes.
//!
//! Each document lives at `<dir>/<id>.pdf`. Writes go through a uniquely
//! named temp file and a rename, so a concurrent reader sees either the old
//! bytes or the new ones.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, warn};

use crate::config::CacheConfig;
use crate::error::StoreError;
use crate::store::validate_id;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct DocumentCache {
    directory: PathBuf,
}

impl DocumentCache {
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self, StoreError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(io_error(&directory))?;
        Ok(Self { directory })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, StoreError> {
        Self::new(&config.directory)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.directory.join(format!("{}.pdf", id)))
    }

    pub fn store(&self, id: &str, content: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.path_for(id)?;
        let tmp = self
            .directory
            .join(format!(".{}.{}.tmp", id, uuid::Uuid::new_v4().simple()));

        fs::write(&tmp, content).map_err(io_error(&tmp))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_error(&path)(e));
        }
        debug!("Cached {} bytes for document {}", content.len(), id);
        Ok(path)
    }

    /// Cached bytes for `id`, or `None` when nothing is cached.
    pub fn read(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Drops the cached copy. Releasing an id that is not cached is a no-op.
    pub fn release(&self, id: &str) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    /// Removes cached files (including abandoned temp files) last modified
    /// more than `max_age` ago. Returns how many were removed.
    pub fn cleanup(&self, max_age: Duration) -> Result<usize, StoreError> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in fs::read_dir(&self.directory).map_err(io_error(&self.directory))? {
            let entry = entry.map_err(io_error(&self.directory))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_cache_file = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "pdf" || e == "tmp")
                .unwrap_or(false);
            if !is_cache_file {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            // Files with an mtime in the future are left alone
            let Some(age) = age else {
                continue;
            };
            if age < max_age {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale cache file {:?}: {}", path, e),
            }
        }

        if removed > 0 {
            debug!("Removed {} stale cache files", removed);
        }
        Ok(removed)
    }
}
