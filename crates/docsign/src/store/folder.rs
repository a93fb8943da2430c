//! Directory-backed document store.
//!
//! Layout: `<root>/<folder>/<id>.pdf` holds the bytes and
//! `<root>/<folder>/<id>.json` the display name, so names may contain
//! characters (such as `/`) that are not valid in file names.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::store::{validate_id, DocumentEntry, DocumentStore};

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    name: String,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Move a file from `src` to `dst`. Uses `rename` first (fast, atomic on
/// the same filesystem) and falls back to copy + delete across devices.
fn move_file(src: &Path, dst: &Path) -> Result<(), StoreError> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    fs::copy(src, dst).map_err(|e| StoreError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    fs::remove_file(src).map_err(|e| StoreError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Writes through a sibling temp file and renames it into place so readers
/// never observe a half-written document.
fn replace_file(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    fs::write(&partial, content).map_err(io_error(&partial))?;
    fs::rename(&partial, path).map_err(|e| {
        let _ = fs::remove_file(&partial);
        StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

pub struct FolderStore {
    root: PathBuf,
}

impl FolderStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Adds a new document to `folder` and returns its generated id.
    pub fn insert(&self, folder: &str, name: &str, content: &[u8]) -> Result<String, StoreError> {
        validate_id(folder)?;
        let dir = self.root.join(folder);
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = dir.join(pdf_file(&id));

        // create_new fails if the file exists (O_CREAT | O_EXCL)
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(io_error(&path))?;
        file.write_all(content).map_err(io_error(&path))?;

        self.write_name(&dir, &id, name)?;
        Ok(id)
    }

    /// Folder directory currently holding `id`.
    fn locate(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        let file_name = pdf_file(id);

        WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.file_type().is_file() && entry.file_name() == file_name.as_str())
            .and_then(|entry| entry.path().parent().map(Path::to_path_buf))
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    fn read_name(&self, dir: &Path, id: &str) -> Result<String, StoreError> {
        let path = dir.join(meta_file(id));
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            // Documents dropped in by hand have no sidecar yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(pdf_file(id)),
            Err(e) => return Err(io_error(&path)(e)),
        };
        let sidecar: Sidecar = serde_json::from_slice(&raw).map_err(|e| StoreError::Metadata {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(sidecar.name)
    }

    fn write_name(&self, dir: &Path, id: &str, name: &str) -> Result<(), StoreError> {
        let sidecar = Sidecar {
            name: name.to_string(),
            updated_at: Some(Utc::now()),
        };
        let json = serde_json::to_vec_pretty(&sidecar).map_err(|e| StoreError::Metadata {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        replace_file(&dir.join(meta_file(id)), &json)
    }
}

impl DocumentStore for FolderStore {
    fn get_content(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.locate(id)?.join(pdf_file(id));
        fs::read(&path).map_err(io_error(&path))
    }

    fn get_name(&self, id: &str) -> Result<String, StoreError> {
        let dir = self.locate(id)?;
        self.read_name(&dir, id)
    }

    fn parents(&self, id: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.locate(id)?;
        Ok(dir
            .file_name()
            .map(|n| vec![n.to_string_lossy().to_string()])
            .unwrap_or_default())
    }

    fn put_content(&self, id: &str, content: &[u8]) -> Result<(), StoreError> {
        let path = self.locate(id)?.join(pdf_file(id));
        replace_file(&path, content)
    }

    fn rename(&self, id: &str, name: &str) -> Result<(), StoreError> {
        let dir = self.locate(id)?;
        self.write_name(&dir, id, name)
    }

    fn move_document(&self, id: &str, from: &str, to: &str) -> Result<(), StoreError> {
        validate_id(id)?;
        validate_id(from)?;
        validate_id(to)?;

        let src_dir = self.root.join(from);
        let src = src_dir.join(pdf_file(id));
        if !src.is_file() {
            return Err(match self.locate(id) {
                Ok(_) => StoreError::NotInFolder {
                    id: id.to_string(),
                    folder: from.to_string(),
                },
                Err(e) => e,
            });
        }
        if from == to {
            return Ok(());
        }

        let dst_dir = self.root.join(to);
        fs::create_dir_all(&dst_dir).map_err(io_error(&dst_dir))?;
        let dst = dst_dir.join(pdf_file(id));
        move_file(&src, &dst)?;

        let meta_src = src_dir.join(meta_file(id));
        if meta_src.exists() {
            if let Err(e) = move_file(&meta_src, &dst_dir.join(meta_file(id))) {
                // Keep the pair together
                let _ = move_file(&dst, &src);
                return Err(e);
            }
        }

        Ok(())
    }

    fn list(&self, folder: &str) -> Result<Vec<DocumentEntry>, StoreError> {
        validate_id(folder)?;
        let dir = self.root.join(folder);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_error(&dir))? {
            let path = entry.map_err(io_error(&dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pdf") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_id(id).is_err() {
                continue;
            }
            entries.push(DocumentEntry {
                id: id.to_string(),
                name: self.read_name(&dir, id)?,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }
}

fn pdf_file(id: &str) -> String {
    format!("{}.pdf", id)
}

fn meta_file(id: &str) -> String {
    format!("{}.json", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FolderStore) {
        let dir = TempDir::new().unwrap();
        let store = FolderStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_insert_and_read() {
        let (_dir, store) = store();
        let id = store.insert("inbox", "repair.pdf", b"%PDF-1.5 body").unwrap();

        assert_eq!(store.get_content(&id).unwrap(), b"%PDF-1.5 body");
        assert_eq!(store.get_name(&id).unwrap(), "repair.pdf");
        assert_eq!(store.parents(&id).unwrap(), vec!["inbox"]);
        assert!(store.root().join("inbox").join(format!("{}.json", id)).exists());
    }

    #[test]
    fn test_rename_allows_slashes() {
        let (_dir, store) = store();
        let id = store.insert("inbox", "repair.pdf", b"x").unwrap();
        store.rename(&id, "2024/08 SRACME - repair.pdf").unwrap();
        assert_eq!(store.get_name(&id).unwrap(), "2024/08 SRACME - repair.pdf");
    }

    #[test]
    fn test_put_content_replaces_bytes() {
        let (_dir, store) = store();
        let id = store.insert("inbox", "a.pdf", b"old").unwrap();
        store.put_content(&id, b"new content").unwrap();
        assert_eq!(store.get_content(&id).unwrap(), b"new content");
        assert!(!store
            .root()
            .join("inbox")
            .join(format!("{}.pdf.partial", id))
            .exists());
    }

    #[test]
    fn test_move_between_folders() {
        let (_dir, store) = store();
        let id = store.insert("01", "a.pdf", b"x").unwrap();

        store.move_document(&id, "01", "02A").unwrap();
        assert_eq!(store.parents(&id).unwrap(), vec!["02A"]);
        assert_eq!(store.get_name(&id).unwrap(), "a.pdf");
        assert!(store.list("01").unwrap().is_empty());

        let err = store.move_document(&id, "01", "02A").unwrap_err();
        assert!(matches!(err, StoreError::NotInFolder { .. }));

        let err = store.move_document("nope", "01", "02A").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_list_orders_by_name() {
        let (_dir, store) = store();
        store.insert("01", "b.pdf", b"1").unwrap();
        let first = store.insert("01", "a.pdf", b"2").unwrap();
        store.insert("02A", "c.pdf", b"3").unwrap();

        let entries = store.list("01").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, first);
        assert_eq!(entries[0].name, "a.pdf");
        assert!(store.list("missing").unwrap().is_empty());
    }

    #[test]
    fn test_document_without_sidecar() {
        let (_dir, store) = store();
        let folder = store.root().join("01");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("manual.pdf"), b"x").unwrap();
        assert_eq!(store.get_name("manual").unwrap(), "manual.pdf");
    }

    #[test]
    fn test_rejects_path_traversal() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get_content("../etc/passwd"),
            Err(StoreError::InvalidId(_))
        ));
        assert!(matches!(
            store.insert("..", "x.pdf", b"x"),
            Err(StoreError::InvalidId(_))
        ));
        assert!(matches!(
            store.move_document("abc", "01", "../out"),
            Err(StoreError::InvalidId(_))
        ));
    }
}
